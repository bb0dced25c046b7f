//! Snapshot reconciliation against the in-memory channel.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rstest::{fixture, rstest};
use test_utils::{flat_terrain, handle_at, update, wait_until, MemoryChannel, StaticLink};
use trundle::net::{run_reconciliation, LoopStats, Reconciler};
use trundle::protocol::{encode_snapshot, RECORD_LEN, SNAPSHOT_PREFIX_LEN};
use trundle::{
    AgentParams, LocalWorld, LoopTiming, Mirror, Pose, ShutdownToken, Snapshot, Texture,
    MAX_PARTICIPANTS,
};

const LOCAL: i32 = 1;

#[fixture]
fn link() -> Arc<StaticLink> {
    Arc::new(StaticLink::new(Texture::new(vec![0xAB; 4])))
}

fn reconciler(link: &Arc<StaticLink>, capacity: usize) -> Reconciler {
    Reconciler::new(LOCAL, AgentParams::default(), Mirror::new(capacity), link.clone())
}

#[rstest]
fn first_sighting_creates_exactly_one_agent(link: Arc<StaticLink>) {
    let reconciler = reconciler(&link, MAX_PARTICIPANTS);
    let snapshot = Snapshot {
        records: vec![update(42, 10.0, 20.0, 5)],
    };

    let first = reconciler.apply_snapshot(&snapshot);
    let again = reconciler.apply_snapshot(&snapshot);

    assert_eq!(first.created, 1);
    assert_eq!(again.created, 0);
    assert_eq!(again.updated, 1, "equal timestamps are re-applied");
    assert_eq!(reconciler.mirror().len(), 1);
    assert_eq!(link.fetched(), vec![42]);
    let handle = reconciler.mirror().get(42).expect("participant 42 mirrored");
    let agent = handle.lock();
    assert_eq!(agent.texture().as_bytes(), &[0xAB; 4]);
    assert_eq!((agent.pose().x, agent.pose().y), (10.0, 20.0));
}

#[rstest]
fn later_records_overwrite_pose(link: Arc<StaticLink>) {
    let reconciler = reconciler(&link, MAX_PARTICIPANTS);
    let created = reconciler.apply_snapshot(&Snapshot {
        records: vec![update(3, 1.0, 1.0, 100)],
    });
    assert_eq!(created.created, 1);

    let moved = reconciler.apply_snapshot(&Snapshot {
        records: vec![update(3, 4.0, 2.0, 150)],
    });

    assert_eq!(moved.updated, 1);
    let handle = reconciler.mirror().get(3).expect("participant 3 mirrored");
    let agent = handle.lock();
    assert_eq!((agent.pose().x, agent.pose().y), (4.0, 2.0));
    assert_eq!(agent.updated_at(), 150);
}

#[rstest]
fn overflowing_the_mirror_drops_newcomers(link: Arc<StaticLink>) {
    let reconciler = reconciler(&link, MAX_PARTICIPANTS);
    let records = (0..MAX_PARTICIPANTS + 2)
        .map(|n| update(i32::try_from(n).expect("small id") + 100, 0.0, 0.0, 1))
        .collect();

    let report = reconciler.apply_snapshot(&Snapshot { records });

    assert_eq!(report.created, MAX_PARTICIPANTS);
    assert_eq!(report.dropped, 2);
    assert_eq!(reconciler.mirror().len(), MAX_PARTICIPANTS);
    assert!(reconciler.mirror().get(100).is_some());
    assert!(reconciler.mirror().get(100 + 11).is_none());
}

#[rstest]
fn empty_snapshot_changes_nothing(link: Arc<StaticLink>) {
    let reconciler = reconciler(&link, 2);
    let report = reconciler.apply_snapshot(&Snapshot::default());
    assert_eq!(report.total(), 0);
    assert!(reconciler.mirror().is_empty());
}

#[rstest]
fn loop_applies_snapshots_from_the_channel(link: Arc<StaticLink>) {
    let channel = Arc::new(MemoryChannel::new(Duration::from_millis(5)));
    let reconciler = reconciler(&link, 4);
    let mirror = reconciler.mirror().clone();
    let shutdown = ShutdownToken::new();

    let inbound = Arc::clone(&channel);
    let token = shutdown.clone();
    let worker = thread::spawn(move || {
        run_reconciliation(inbound.as_ref(), &reconciler, LoopTiming::default(), &token)
    });

    channel.push(vec![0xFF; 3]);
    channel.push(
        encode_snapshot(&Snapshot {
            records: vec![update(LOCAL, 0.0, 0.0, 1), update(9, 2.0, 3.0, 1)],
        })
        .expect("snapshot fits the wire"),
    );
    assert!(wait_until(Duration::from_secs(2), || mirror.get(9).is_some()));

    shutdown.cancel();
    let stats = worker.join().expect("reconciliation thread panicked");
    assert!(channel.drained());
    assert_eq!(stats.malformed, 1);
    assert_eq!(stats.completed, 1);
    assert!(mirror.get(LOCAL).is_none(), "the local participant is never mirrored");
}

fn run_until_drained(
    reconciler: Reconciler,
    datagrams: Vec<Vec<u8>>,
    done: impl Fn(&Mirror) -> bool,
) -> (Mirror, LoopStats) {
    let channel = Arc::new(MemoryChannel::new(Duration::from_millis(5)));
    let mirror = reconciler.mirror().clone();
    let shutdown = ShutdownToken::new();
    let inbound = Arc::clone(&channel);
    let token = shutdown.clone();
    let worker = thread::spawn(move || {
        run_reconciliation(inbound.as_ref(), &reconciler, LoopTiming::default(), &token)
    });
    for datagram in datagrams {
        channel.push(datagram);
    }
    assert!(wait_until(Duration::from_secs(2), || channel.drained() && done(&mirror)));
    shutdown.cancel();
    let stats = worker.join().expect("reconciliation thread panicked");
    (mirror, stats)
}

#[rstest]
fn non_finite_records_are_dropped_and_later_updates_still_move_the_agent(
    link: Arc<StaticLink>,
) {
    let mut poisoned = update(5, 4.0, 4.0, 1);
    poisoned.translational_force = f32::NAN;
    let datagrams = vec![
        encode_snapshot(&Snapshot {
            records: vec![poisoned],
        })
        .expect("snapshot fits the wire"),
        encode_snapshot(&Snapshot {
            records: vec![update(5, 12.0, 12.0, 2)],
        })
        .expect("snapshot fits the wire"),
    ];

    let (mirror, stats) = run_until_drained(reconciler(&link, 4), datagrams, |mirror| {
        mirror.get(5).is_some()
    });

    assert_eq!(stats.malformed, 1);
    assert_eq!(stats.completed, 1);
    let world = LocalWorld::new(
        Arc::new(flat_terrain(20)),
        handle_at(LOCAL, 2.0, 2.0, 0.0),
        mirror.clone(),
        Pose::ground(10.0, 10.0, 0.0),
    );
    for _ in 0..5 {
        let report = world.tick(0.1);
        assert_eq!(report.rejection_of(5), None);
    }
    let handle = mirror.get(5).expect("participant 5 mirrored");
    let agent = handle.lock();
    assert!(agent.velocity().translational.is_finite());
    assert_eq!((agent.pose().x, agent.pose().y), (12.0, 12.0));
}

#[rstest]
fn snapshots_larger_than_a_page_are_applied(link: Arc<StaticLink>) {
    let remote = 130;
    let records = std::iter::once(update(LOCAL, 0.0, 0.0, 1))
        .chain((0..remote).map(|n| {
            update(i32::try_from(n).expect("small id") + 100, 1.0, 1.0, 1)
        }))
        .collect();
    let datagram = encode_snapshot(&Snapshot { records }).expect("snapshot fits the wire");
    assert_eq!(datagram.len(), SNAPSHOT_PREFIX_LEN + (remote + 1) * RECORD_LEN);
    assert!(datagram.len() > 4096);

    let (mirror, stats) = run_until_drained(reconciler(&link, 200), vec![datagram], |mirror| {
        mirror.len() == remote
    });

    assert_eq!(stats.malformed, 0);
    assert_eq!(stats.completed, 1);
    assert_eq!(mirror.len(), remote);
}

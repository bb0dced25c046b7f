//! Applies server snapshots to the mirror.

use std::sync::Arc;
use std::thread;

use log::{debug, info, trace, warn};

use crate::agent::{Agent, AgentHandle, ParticipantId, Pose};
use crate::config::{AgentParams, LoopTiming};
use crate::constants::DATAGRAM_CAPACITY;
use crate::mirror::{Lookup, Mirror};
use crate::protocol::{decode_snapshot, AgentUpdate, Snapshot};

use super::{DatagramChannel, LoopStats, ReliableLink, ShutdownToken, TransportError};

/// What happened to the records of one snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Records applied to an existing agent.
    pub updated: usize,
    /// Records that created a new agent.
    pub created: usize,
    /// Records older than the agent's last applied update.
    pub stale: usize,
    /// New participants refused because the mirror is full.
    pub dropped: usize,
    /// Records describing the local participant.
    pub skipped_self: usize,
    /// New participants whose texture could not be fetched.
    pub failed: usize,
}

impl ReconcileReport {
    /// Number of records the report accounts for.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.updated + self.created + self.stale + self.dropped + self.skipped_self + self.failed
    }
}

/// Merges snapshot records into the mirror.
///
/// The local participant is never touched: its state is owned by the
/// simulation thread.
pub struct Reconciler {
    local_id: ParticipantId,
    params: AgentParams,
    mirror: Mirror,
    link: Arc<dyn ReliableLink>,
}

impl Reconciler {
    /// Creates a reconciler writing into `mirror`.
    ///
    /// Agents it creates use `params`; their textures come from `link`.
    #[must_use]
    pub const fn new(
        local_id: ParticipantId,
        params: AgentParams,
        mirror: Mirror,
        link: Arc<dyn ReliableLink>,
    ) -> Self {
        Self {
            local_id,
            params,
            mirror,
            link,
        }
    }

    /// Mirror the reconciler writes into.
    #[must_use]
    pub const fn mirror(&self) -> &Mirror {
        &self.mirror
    }

    /// Applies every record of `snapshot`, in order.
    #[must_use]
    pub fn apply_snapshot(&self, snapshot: &Snapshot) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        for record in &snapshot.records {
            self.apply_record(record, &mut report);
        }
        trace!("reconciled snapshot: {report:?}");
        report
    }

    fn apply_record(&self, record: &AgentUpdate, report: &mut ReconcileReport) {
        if record.id == self.local_id {
            report.skipped_self += 1;
            return;
        }
        // Clone the handle out so the table lock is released before the
        // agent lock is taken.
        let lookup = self.mirror.lock().lookup(record.id);
        match lookup {
            Lookup::Tracked(handle) => {
                let mut agent = handle.lock();
                if record.timestamp < agent.updated_at() {
                    report.stale += 1;
                } else {
                    agent.apply_update(record);
                    report.updated += 1;
                }
            }
            // Only this loop reserves slots, so a pending slot cannot be
            // observed here; treat it like a full mirror.
            Lookup::Pending => report.dropped += 1,
            Lookup::Absent => self.create(record, report),
        }
    }

    fn create(&self, record: &AgentUpdate, report: &mut ReconcileReport) {
        let Some(slot) = self.mirror.lock().reserve(record.id) else {
            trace!("mirror full, dropping participant {}", record.id);
            report.dropped += 1;
            return;
        };
        let texture = match self.link.fetch_texture(record.id) {
            Ok(texture) => texture,
            Err(err) => {
                warn!("texture fetch for participant {} failed: {err}", record.id);
                self.mirror.lock().release(slot);
                report.failed += 1;
                return;
            }
        };
        let mut agent = Agent::new(
            record.id,
            self.params,
            Pose::ground(record.x, record.y, record.theta),
            texture,
        );
        agent.apply_update(record);
        if self.mirror.lock().fill(slot, AgentHandle::new(agent)) {
            info!("mirroring participant {} in slot {}", record.id, slot.get());
            report.created += 1;
        } else {
            report.failed += 1;
        }
    }
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("local_id", &self.local_id)
            .field("mirror", &self.mirror)
            .finish_non_exhaustive()
    }
}

/// Receives snapshots and applies them until `shutdown` is cancelled.
///
/// Timeouts only re-check the shutdown flag. Malformed datagrams are
/// dropped. Transport failures pause for `timing.retry_delay` before the
/// next attempt.
#[must_use]
pub fn run_reconciliation(
    channel: &dyn DatagramChannel,
    reconciler: &Reconciler,
    timing: LoopTiming,
    shutdown: &ShutdownToken,
) -> LoopStats {
    let mut stats = LoopStats::default();
    let mut buffer = vec![0_u8; DATAGRAM_CAPACITY];
    while !shutdown.is_cancelled() {
        let len = match channel.recv(&mut buffer) {
            Ok(len) => len,
            Err(TransportError::TimedOut) => {
                stats.timeouts += 1;
                continue;
            }
            Err(err) => {
                warn!("snapshot receive failed: {err}");
                stats.transport_errors += 1;
                thread::sleep(timing.retry_delay);
                continue;
            }
        };
        let datagram = buffer.get(..len).unwrap_or_default();
        match decode_snapshot(datagram) {
            Ok(snapshot) => {
                let report = reconciler.apply_snapshot(&snapshot);
                if report.dropped > 0 {
                    debug!("{} participants dropped, mirror is full", report.dropped);
                }
                stats.completed += 1;
            }
            Err(err) => {
                warn!("dropping malformed datagram of {len} bytes: {err}");
                stats.malformed += 1;
            }
        }
    }
    debug!("reconciliation loop stopped: {stats:?}");
    stats
}

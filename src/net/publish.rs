//! Periodic publication of the local agent.

use std::thread;

use log::{debug, trace, warn};

use crate::agent::AgentHandle;
use crate::config::LoopTiming;
use crate::numeric::now_millis;
use crate::protocol::encode_update;

use super::{DatagramChannel, LoopStats, ShutdownToken};

/// Sends the local agent's state every `timing.publish_interval` until
/// `shutdown` is cancelled.
///
/// The agent lock is held only while the record is copied out. Send
/// failures are logged and the loop carries on at the same cadence.
#[must_use]
pub fn run_publication(
    channel: &dyn DatagramChannel,
    local: &AgentHandle,
    timing: LoopTiming,
    shutdown: &ShutdownToken,
) -> LoopStats {
    let mut stats = LoopStats::default();
    while !shutdown.is_cancelled() {
        let update = local.lock().to_update(now_millis());
        match channel.send(&encode_update(&update)) {
            Ok(()) => {
                trace!("published ({:.3}, {:.3}) at {}", update.x, update.y, update.timestamp);
                stats.completed += 1;
            }
            Err(err) => {
                warn!("publishing participant {} failed: {err}", update.id);
                stats.transport_errors += 1;
            }
        }
        thread::sleep(timing.publish_interval);
    }
    debug!("publication loop stopped: {stats:?}");
    stats
}

//! Lifecycle of the two background network loops.

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{error, info, warn};
use thiserror::Error;

use crate::agent::{AgentHandle, ParticipantId};
use crate::config::{AgentParams, LoopTiming};
use crate::mirror::Mirror;

use super::{
    run_publication, run_reconciliation, DatagramChannel, LoopStats, Reconciler, ReliableLink,
    ShutdownToken,
};

/// Failures while starting a session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// A background thread could not be spawned.
    #[error("failed to spawn {thread} thread: {source}")]
    Spawn {
        /// Name of the thread.
        thread: &'static str,
        /// Underlying OS error.
        source: io::Error,
    },
}

/// Counters of a finished session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionSummary {
    /// Stats of the publication loop.
    pub publication: LoopStats,
    /// Stats of the reconciliation loop.
    pub reconciliation: LoopStats,
    /// Whether the departure notice reached the server.
    pub goodbye_sent: bool,
}

const PUBLISH_THREAD: &str = "trundle-publish";
const RECONCILE_THREAD: &str = "trundle-reconcile";

fn spawn_loop<F>(name: &'static str, body: F) -> Result<JoinHandle<LoopStats>, SessionError>
where
    F: FnOnce() -> LoopStats + Send + 'static,
{
    thread::Builder::new()
        .name(name.to_owned())
        .spawn(body)
        .map_err(|source| SessionError::Spawn {
            thread: name,
            source,
        })
}

fn join_loop(name: &str, handle: Option<JoinHandle<LoopStats>>) -> LoopStats {
    match handle.map(JoinHandle::join) {
        Some(Ok(stats)) => stats,
        Some(Err(_)) => {
            error!("{name} thread panicked");
            LoopStats::default()
        }
        None => LoopStats::default(),
    }
}

/// Running publication and reconciliation loops.
///
/// Dropping a session stops both loops without notifying the server; call
/// [`Session::shutdown`] for an orderly departure.
pub struct Session {
    local_id: ParticipantId,
    link: Arc<dyn ReliableLink>,
    shutdown: ShutdownToken,
    publisher: Option<JoinHandle<LoopStats>>,
    reconciler: Option<JoinHandle<LoopStats>>,
}

impl Session {
    /// Spawns the publication and reconciliation threads.
    ///
    /// Both loops share `channel`. Remote agents are created in `mirror`
    /// with `params`; the local agent behind `local` is only read.
    ///
    /// # Errors
    /// Returns [`SessionError::Spawn`] when a thread cannot be started. A
    /// loop that was already running is stopped before returning.
    pub fn start(
        channel: Arc<dyn DatagramChannel>,
        link: Arc<dyn ReliableLink>,
        local: AgentHandle,
        mirror: Mirror,
        params: AgentParams,
        timing: LoopTiming,
    ) -> Result<Self, SessionError> {
        let local_id = local.id();
        let shutdown = ShutdownToken::new();

        let publish_channel = Arc::clone(&channel);
        let publish_token = shutdown.clone();
        let publisher = spawn_loop(PUBLISH_THREAD, move || {
            run_publication(publish_channel.as_ref(), &local, timing, &publish_token)
        })?;

        let reconcile = Reconciler::new(local_id, params, mirror, Arc::clone(&link));
        let reconcile_token = shutdown.clone();
        let spawned = spawn_loop(RECONCILE_THREAD, move || {
            run_reconciliation(channel.as_ref(), &reconcile, timing, &reconcile_token)
        });
        let reconciler = match spawned {
            Ok(handle) => handle,
            Err(err) => {
                shutdown.cancel();
                join_loop(PUBLISH_THREAD, Some(publisher));
                return Err(err);
            }
        };

        info!("session started for participant {local_id}");
        Ok(Self {
            local_id,
            link,
            shutdown,
            publisher: Some(publisher),
            reconciler: Some(reconciler),
        })
    }

    /// Token that stops both loops when cancelled.
    #[must_use]
    pub fn shutdown_token(&self) -> ShutdownToken {
        self.shutdown.clone()
    }

    /// Participant this session publishes.
    #[must_use]
    pub const fn local_id(&self) -> ParticipantId {
        self.local_id
    }

    fn stop(&mut self) -> (LoopStats, LoopStats) {
        self.shutdown.cancel();
        let publication = join_loop(PUBLISH_THREAD, self.publisher.take());
        let reconciliation = join_loop(RECONCILE_THREAD, self.reconciler.take());
        (publication, reconciliation)
    }

    /// Stops both loops, waits for them and tells the server the local
    /// participant is leaving.
    ///
    /// Returns within roughly one receive timeout plus one publish interval,
    /// plus however long the goodbye takes.
    #[must_use]
    pub fn shutdown(mut self) -> SessionSummary {
        let (publication, reconciliation) = self.stop();
        let goodbye_sent = match self.link.send_goodbye(self.local_id) {
            Ok(()) => true,
            Err(err) => {
                warn!("goodbye for participant {} not delivered: {err}", self.local_id);
                false
            }
        };
        let summary = SessionSummary {
            publication,
            reconciliation,
            goodbye_sent,
        };
        info!("session ended: {summary:?}");
        summary
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.publisher.is_some() || self.reconciler.is_some() {
            self.stop();
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("local_id", &self.local_id)
            .field("cancelled", &self.shutdown.is_cancelled())
            .finish_non_exhaustive()
    }
}

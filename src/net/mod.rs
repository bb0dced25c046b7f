//! Network plumbing: the datagram channel to the server, the reliable
//! side channel, and the two background loops that keep the local agent
//! published and the mirror reconciled.

pub mod channel;
pub mod link;
pub mod publish;
pub mod reconcile;
pub mod session;
pub mod shutdown;

pub use channel::{DatagramChannel, TransportError, UdpChannel};
pub use link::{LinkError, OfflineLink, ReliableLink};
pub use publish::run_publication;
pub use reconcile::{run_reconciliation, ReconcileReport, Reconciler};
pub use session::{Session, SessionError, SessionSummary};
pub use shutdown::ShutdownToken;

/// Counters reported by a background loop when it stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    /// Iterations that completed their work.
    pub completed: u64,
    /// Receive attempts that timed out without data.
    pub timeouts: u64,
    /// Datagrams dropped because they could not be decoded.
    pub malformed: u64,
    /// Iterations that failed on the transport.
    pub transport_errors: u64,
}

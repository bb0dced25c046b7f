//! In-memory stand-ins for the datagram channel and the reliable link.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use trundle::{DatagramChannel, LinkError, ParticipantId, ReliableLink, Texture, TransportError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Loopback channel: tests push inbound datagrams and inspect sent ones.
///
/// `recv` blocks for up to the configured timeout and then reports
/// [`TransportError::TimedOut`], like a socket with a read timeout.
#[derive(Debug)]
pub struct MemoryChannel {
    inbox: Mutex<VecDeque<Vec<u8>>>,
    arrived: Condvar,
    outbox: Mutex<Vec<Vec<u8>>>,
    timeout: Duration,
}

impl MemoryChannel {
    /// Creates an empty channel whose receives time out after `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self {
            inbox: Mutex::new(VecDeque::new()),
            arrived: Condvar::new(),
            outbox: Mutex::new(Vec::new()),
            timeout,
        }
    }

    /// Queues a datagram for the next `recv`.
    pub fn push(&self, datagram: Vec<u8>) {
        lock(&self.inbox).push_back(datagram);
        self.arrived.notify_all();
    }

    /// Datagrams sent so far.
    pub fn sent(&self) -> Vec<Vec<u8>> {
        lock(&self.outbox).clone()
    }

    /// Whether every queued datagram has been received.
    pub fn drained(&self) -> bool {
        lock(&self.inbox).is_empty()
    }
}

impl DatagramChannel for MemoryChannel {
    fn send(&self, datagram: &[u8]) -> Result<(), TransportError> {
        lock(&self.outbox).push(datagram.to_vec());
        Ok(())
    }

    fn recv(&self, buffer: &mut [u8]) -> Result<usize, TransportError> {
        let (mut inbox, _) = self
            .arrived
            .wait_timeout_while(lock(&self.inbox), self.timeout, |queue| queue.is_empty())
            .unwrap_or_else(PoisonError::into_inner);
        let datagram = inbox.pop_front().ok_or(TransportError::TimedOut)?;
        let len = datagram.len().min(buffer.len());
        buffer[..len].copy_from_slice(&datagram[..len]);
        Ok(len)
    }
}

/// Reliable link serving one fixed texture and recording every call.
#[derive(Debug, Default)]
pub struct StaticLink {
    texture: Texture,
    fetched: Mutex<Vec<ParticipantId>>,
    goodbyes: Mutex<Vec<ParticipantId>>,
}

impl StaticLink {
    /// Link that answers every fetch with `texture`.
    pub fn new(texture: Texture) -> Self {
        Self {
            texture,
            ..Self::default()
        }
    }

    /// Participants whose texture was requested, in order.
    pub fn fetched(&self) -> Vec<ParticipantId> {
        lock(&self.fetched).clone()
    }

    /// Participants that said goodbye, in order.
    pub fn goodbyes(&self) -> Vec<ParticipantId> {
        lock(&self.goodbyes).clone()
    }
}

impl ReliableLink for StaticLink {
    fn fetch_texture(&self, id: ParticipantId) -> Result<Texture, LinkError> {
        lock(&self.fetched).push(id);
        Ok(self.texture.clone())
    }

    fn send_goodbye(&self, id: ParticipantId) -> Result<(), LinkError> {
        lock(&self.goodbyes).push(id);
        Ok(())
    }
}

/// Polls `condition` every millisecond until it holds or `limit` elapses.
///
/// Returns whether the condition was met.
pub fn wait_until(limit: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    condition()
}

//! Unreliable datagram channel to the game server.

use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;

use thiserror::Error;

/// Failures of the datagram transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The socket reported an error.
    #[error("socket error: {0}")]
    Io(#[from] io::Error),
    /// No datagram arrived within the receive timeout.
    #[error("receive timed out")]
    TimedOut,
    /// The socket accepted fewer bytes than the datagram holds.
    #[error("short send: {sent} of {expected} bytes")]
    Truncated {
        /// Bytes the socket accepted.
        sent: usize,
        /// Length of the datagram.
        expected: usize,
    },
}

/// Connected, message-oriented channel to the server.
///
/// Implementations must be usable from the publication and reconciliation
/// threads at the same time.
#[cfg_attr(test, mockall::automock)]
pub trait DatagramChannel: Send + Sync {
    /// Sends one datagram.
    ///
    /// # Errors
    /// Returns [`TransportError`] when the datagram was not sent in full.
    fn send(&self, datagram: &[u8]) -> Result<(), TransportError>;

    /// Waits for one datagram and copies it into `buffer`, returning its
    /// length. Datagrams longer than `buffer` are truncated.
    ///
    /// # Errors
    /// Returns [`TransportError::TimedOut`] when nothing arrived within the
    /// channel's timeout, or another [`TransportError`] on socket failure.
    fn recv(&self, buffer: &mut [u8]) -> Result<usize, TransportError>;
}

/// [`DatagramChannel`] over a connected UDP socket.
#[derive(Debug)]
pub struct UdpChannel {
    socket: UdpSocket,
}

impl UdpChannel {
    /// Binds `bind`, connects to `server` and sets the receive timeout.
    ///
    /// # Errors
    /// Returns [`TransportError::Io`] when any socket call fails.
    pub fn connect(
        bind: SocketAddr,
        server: SocketAddr,
        receive_timeout: Duration,
    ) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind(bind)?;
        socket.connect(server)?;
        Self::from_socket(socket, receive_timeout)
    }

    /// Wraps an already connected socket.
    ///
    /// # Errors
    /// Returns [`TransportError::Io`] when the timeout cannot be set, for
    /// example because it is zero.
    pub fn from_socket(socket: UdpSocket, receive_timeout: Duration) -> Result<Self, TransportError> {
        socket.set_read_timeout(Some(receive_timeout))?;
        Ok(Self { socket })
    }

    /// Address the socket is bound to.
    ///
    /// # Errors
    /// Returns [`TransportError::Io`] when the socket cannot report it.
    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.socket.local_addr()?)
    }
}

impl DatagramChannel for UdpChannel {
    fn send(&self, datagram: &[u8]) -> Result<(), TransportError> {
        let sent = self.socket.send(datagram)?;
        if sent == datagram.len() {
            Ok(())
        } else {
            Err(TransportError::Truncated {
                sent,
                expected: datagram.len(),
            })
        }
    }

    fn recv(&self, buffer: &mut [u8]) -> Result<usize, TransportError> {
        match self.socket.recv(buffer) {
            Ok(len) => Ok(len),
            // Platforms disagree on which kind a read timeout reports.
            Err(err)
                if matches!(
                    err.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                ) =>
            {
                Err(TransportError::TimedOut)
            }
            Err(err) => Err(TransportError::Io(err)),
        }
    }
}

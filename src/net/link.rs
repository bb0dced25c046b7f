//! Reliable side channel used for textures and session teardown.

use log::info;
use thiserror::Error;

use crate::agent::{ParticipantId, Texture};

/// Failures of the reliable channel.
#[derive(Debug, Error)]
pub enum LinkError {
    /// The server does not know the participant.
    #[error("no texture for participant {0}")]
    UnknownParticipant(ParticipantId),
    /// The request could not be completed.
    #[error("reliable channel failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Request/response channel with delivery guarantees.
///
/// Calls block, so callers must not hold the mirror lock across them.
#[cfg_attr(test, mockall::automock)]
pub trait ReliableLink: Send + Sync {
    /// Retrieves the display texture of a participant.
    ///
    /// # Errors
    /// Returns [`LinkError`] when the texture cannot be obtained.
    fn fetch_texture(&self, id: ParticipantId) -> Result<Texture, LinkError>;

    /// Tells the server that `id` is leaving the session.
    ///
    /// # Errors
    /// Returns [`LinkError`] when the notice cannot be delivered.
    fn send_goodbye(&self, id: ParticipantId) -> Result<(), LinkError>;
}

/// Link for running without a reliable server endpoint.
///
/// Textures come back empty and the goodbye is only logged.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineLink;

impl ReliableLink for OfflineLink {
    fn fetch_texture(&self, _id: ParticipantId) -> Result<Texture, LinkError> {
        Ok(Texture::default())
    }

    fn send_goodbye(&self, id: ParticipantId) -> Result<(), LinkError> {
        info!("participant {id} leaving (offline link, nothing sent)");
        Ok(())
    }
}

//! Client core for a networked vehicle simulation over heightfield terrain.
//! Re-exports the agent, physics and networking types used by the binary and tests.
pub mod agent;
pub mod collision;
pub mod config;
pub mod constants;
pub mod logging;
pub mod mirror;
pub mod net;
pub mod numeric;
pub mod physics;
pub mod protocol;
pub mod surface;
pub mod vector_math;
pub mod world;
pub use constants::*;

// Re-export commonly used items
pub use agent::{Agent, AgentHandle, Forces, ParticipantId, Pose, Texture, Velocity};
pub use config::{AgentParams, ClientConfig, ConfigError, LoopTiming};
pub use logging::init as init_logging;
pub use mirror::Mirror;
pub use net::{
    DatagramChannel, LinkError, OfflineLink, ReliableLink, Session, SessionError, ShutdownToken,
    TransportError, UdpChannel,
};
pub use physics::{advance, Rejection, StepOutcome};
pub use protocol::{AgentUpdate, Message, ProtocolError, Snapshot};
pub use surface::{Heightfield, Surface, TerrainError};
pub use world::{LocalWorld, TickReport};

pub mod prelude {
    //! Prelude exports used in documentation examples.
    //!
    //! ```rust,no_run
    //! use trundle::prelude::*;
    //! ```

    pub use crate::advance;
    pub use crate::Agent;
    pub use crate::AgentHandle;
    pub use crate::AgentParams;
    pub use crate::Heightfield;
    pub use crate::LocalWorld;
    pub use crate::Mirror;
    pub use crate::Pose;
    pub use crate::Surface;
}

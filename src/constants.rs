//! Simulation and network constants shared across the client core.
//!
//! Tunable per-agent values live in [`crate::config::AgentParams`]; the
//! constants here are fixed by the protocol or the world model.

/// Magnitude of gravitational acceleration projected along the ground.
pub const GRAVITY: f32 = 9.8;
/// Half-width of the axis-aligned box used for proximity checks.
pub const COLLISION_RANGE: f32 = 1.5;
/// Maximum number of remote participants mirrored by one client.
pub const MAX_PARTICIPANTS: usize = 10;

/// Default cap on the translational force consumed per step.
pub const MAX_TRANSLATIONAL_FORCE: f32 = 10.0;
/// Default cap on the rotational force consumed per step.
pub const MAX_ROTATIONAL_FORCE: f32 = 0.5;
/// Translational forces below this magnitude are treated as zero.
pub const MIN_TRANSLATIONAL_FORCE: f32 = 0.05;
/// Rotational forces below this magnitude are treated as zero.
pub const MIN_ROTATIONAL_FORCE: f32 = 0.05;
/// Fraction of translational velocity kept after each step.
pub const TRANSLATIONAL_VISCOSITY: f32 = 0.5;
/// Fraction of rotational velocity kept after each step.
pub const ROTATIONAL_VISCOSITY: f32 = 0.5;
/// Per-tick decay applied to the translational control input.
pub const TRANSLATIONAL_CONTROL_DECAY: f32 = 0.999;
/// Per-tick decay applied to the rotational control input.
pub const ROTATIONAL_CONTROL_DECAY: f32 = 0.7;

/// Largest datagram the client will send or accept: the UDP payload limit
/// over IPv4.
pub const DATAGRAM_CAPACITY: usize = 65_507;
/// Default UDP port of the game server.
pub const SERVER_PORT: u16 = 3000;
/// Default delay between two outgoing state updates, in milliseconds.
pub const PUBLISH_INTERVAL_MS: u64 = 50;
/// Default receive timeout of the reconciliation loop, in milliseconds.
pub const RECEIVE_TIMEOUT_MS: u64 = 200;
/// Default pause after a failed loop iteration, in milliseconds.
pub const RETRY_DELAY_MS: u64 = 100;
/// Default physics step of the headless frame loop, in seconds.
pub const FRAME_STEP: f32 = 1.0 / 60.0;

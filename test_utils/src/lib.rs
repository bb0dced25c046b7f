//! Utility helpers for tests.
//!
//! Fixture constructors for terrain, agents and wire records, plus
//! in-memory implementations of the network seams so loop tests run
//! without sockets.

pub mod agents;
pub mod net;

pub use agents::{agent_at, flat_terrain, handle_at, sloped_terrain, update};
pub use net::{wait_until, MemoryChannel, StaticLink};

//! Convenience constructors for terrain, agents and wire records.

use trundle::{
    Agent, AgentHandle, AgentParams, AgentUpdate, Heightfield, ParticipantId, Pose, Texture,
};

/// Level terrain covering `[0, extent]` in both axes with unit sample spacing.
///
/// # Panics
/// Panics when `extent` is smaller than one.
///
/// # Examples
/// ```
/// use test_utils::flat_terrain;
/// assert_eq!(flat_terrain(100).extent(), (100.0, 100.0));
/// ```
pub fn flat_terrain(extent: usize) -> Heightfield {
    Heightfield::flat(extent + 1, extent + 1, 1.0, 1.0, 0.0)
        .unwrap_or_else(|e| panic!("flat terrain of extent {extent}: {e}"))
}

/// Terrain rising by `rise` per unit of x, with unit sample spacing.
///
/// # Panics
/// Panics when `extent` is smaller than one.
pub fn sloped_terrain(extent: usize, rise: f32) -> Heightfield {
    Heightfield::from_fn(extent + 1, extent + 1, 1.0, 1.0, |row, _| {
        trundle::numeric::index_to_f32(row) * rise
    })
    .unwrap_or_else(|e| panic!("sloped terrain of extent {extent}: {e}"))
}

/// Agent with default parameters and an empty texture at `(x, y)`.
pub fn agent_at(id: ParticipantId, x: f32, y: f32, theta: f32) -> Agent {
    Agent::new(
        id,
        AgentParams::default(),
        Pose::ground(x, y, theta),
        Texture::default(),
    )
}

/// [`agent_at`] wrapped in a shareable handle.
pub fn handle_at(id: ParticipantId, x: f32, y: f32, theta: f32) -> AgentHandle {
    AgentHandle::new(agent_at(id, x, y, theta))
}

/// Wire record for participant `id` at `(x, y)` with no pending forces.
pub fn update(id: ParticipantId, x: f32, y: f32, timestamp: u64) -> AgentUpdate {
    AgentUpdate {
        id,
        x,
        y,
        theta: 0.0,
        translational_force: 0.0,
        rotational_force: 0.0,
        timestamp,
    }
}

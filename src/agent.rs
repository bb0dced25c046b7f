//! Agent state shared between the physics thread and the network loops.
//!
//! An [`Agent`] is a plain record; cross-thread access always goes through
//! an [`AgentHandle`], which owns the record behind its own mutex. Dropping
//! the last handle releases the agent together with its texture.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use glam::Mat4;

use crate::config::AgentParams;
use crate::protocol::AgentUpdate;

/// Network-wide participant identifier.
pub type ParticipantId = i32;

/// Position and heading of an agent on the terrain.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Pose {
    /// Ground x coordinate.
    pub x: f32,
    /// Ground y coordinate.
    pub y: f32,
    /// Elevation, derived from the terrain.
    pub z: f32,
    /// Heading in radians.
    pub theta: f32,
}

impl Pose {
    /// Pose on the ground at `(x, y)` facing `theta`; elevation is filled in
    /// by the next integration step.
    #[must_use]
    pub const fn ground(x: f32, y: f32, theta: f32) -> Self {
        Self { x, y, z: 0.0, theta }
    }
}

/// Pending control input accumulators.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Forces {
    /// Force along the heading.
    pub translational: f32,
    /// Turning force.
    pub rotational: f32,
}

/// Translational and rotational velocity of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Velocity {
    /// Speed along the heading.
    pub translational: f32,
    /// Angular speed around the terrain normal.
    pub rotational: f32,
}

/// Opaque display texture of a participant.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Texture(Vec<u8>);

impl Texture {
    /// Wraps encoded image bytes.
    #[must_use]
    pub const fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Encoded image bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Whether the texture carries no image data.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Texture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Texture({} bytes)", self.0.len())
    }
}

/// Mutable state of one participant's vehicle.
#[derive(Debug, Clone)]
pub struct Agent {
    id: ParticipantId,
    params: AgentParams,
    pub(crate) pose: Pose,
    pub(crate) settled: Pose,
    pub(crate) velocity: Velocity,
    pub(crate) forces: Forces,
    pub(crate) camera_to_world: Mat4,
    pub(crate) world_to_camera: Mat4,
    pub(crate) is_new: bool,
    updated_at: u64,
    texture: Texture,
}

impl Agent {
    /// Creates an agent at rest at `spawn`.
    ///
    /// The agent starts in its "new" state with `spawn` as its settled pose.
    #[must_use]
    pub fn new(id: ParticipantId, params: AgentParams, spawn: Pose, texture: Texture) -> Self {
        Self {
            id,
            params,
            pose: spawn,
            settled: spawn,
            velocity: Velocity::default(),
            forces: Forces::default(),
            camera_to_world: Mat4::IDENTITY,
            world_to_camera: Mat4::IDENTITY,
            is_new: true,
            updated_at: 0,
            texture,
        }
    }

    /// Participant id.
    #[must_use]
    pub const fn id(&self) -> ParticipantId {
        self.id
    }

    /// Force limits and decay factors.
    #[must_use]
    pub const fn params(&self) -> &AgentParams {
        &self.params
    }

    /// Current pose.
    #[must_use]
    pub const fn pose(&self) -> Pose {
        self.pose
    }

    /// Last pose known to be collision-free.
    #[must_use]
    pub const fn settled_pose(&self) -> Pose {
        self.settled
    }

    /// Current velocities.
    #[must_use]
    pub const fn velocity(&self) -> Velocity {
        self.velocity
    }

    /// Overwrites both velocities, e.g. after a teleport.
    pub fn set_velocity(&mut self, velocity: Velocity) {
        self.velocity = velocity;
    }

    /// Pending control input.
    #[must_use]
    pub const fn forces(&self) -> Forces {
        self.forces
    }

    /// Replaces the pending control input.
    pub fn set_forces(&mut self, forces: Forces) {
        self.forces = forces;
    }

    /// Whether the agent has yet to complete a successful integration step.
    #[must_use]
    pub const fn is_new(&self) -> bool {
        self.is_new
    }

    /// Timestamp (ms since the Unix epoch) of the last applied network update.
    #[must_use]
    pub const fn updated_at(&self) -> u64 {
        self.updated_at
    }

    /// Display texture.
    #[must_use]
    pub const fn texture(&self) -> &Texture {
        &self.texture
    }

    /// Agent-to-world frame from the last successful integration step.
    #[must_use]
    pub const fn camera_to_world(&self) -> Mat4 {
        self.camera_to_world
    }

    /// World-to-agent frame from the last successful integration step.
    #[must_use]
    pub const fn world_to_camera(&self) -> Mat4 {
        self.world_to_camera
    }

    /// Adds to the translational accumulator. The cap is applied when the
    /// force is consumed, not here.
    pub fn increase_translational_force(&mut self, amount: f32) {
        self.forces.translational += amount;
    }

    /// Subtracts from the translational accumulator.
    pub fn decrease_translational_force(&mut self, amount: f32) {
        self.forces.translational -= amount;
    }

    /// Adds to the rotational accumulator.
    pub fn increase_rotational_force(&mut self, amount: f32) {
        self.forces.rotational += amount;
    }

    /// Subtracts from the rotational accumulator.
    pub fn decrease_rotational_force(&mut self, amount: f32) {
        self.forces.rotational -= amount;
    }

    /// Scales both accumulators towards zero.
    ///
    /// Factors are clamped to `[0, 1]`.
    ///
    /// # Examples
    /// ```
    /// use trundle::agent::{Agent, Pose, Texture};
    /// use trundle::config::AgentParams;
    /// let mut agent = Agent::new(1, AgentParams::default(), Pose::default(), Texture::default());
    /// agent.increase_translational_force(4.0);
    /// agent.increase_rotational_force(1.0);
    /// agent.decay_forces(0.5, 0.0);
    /// assert_eq!(agent.forces().translational, 2.0);
    /// assert_eq!(agent.forces().rotational, 0.0);
    /// ```
    pub fn decay_forces(&mut self, translational: f32, rotational: f32) {
        self.forces.translational *= translational.clamp(0.0, 1.0);
        self.forces.rotational *= rotational.clamp(0.0, 1.0);
    }

    /// Overwrites the ground position and heading.
    ///
    /// Elevation is left as-is until the next integration step re-derives it.
    pub fn set_pose(&mut self, x: f32, y: f32, theta: f32) {
        self.pose.x = x;
        self.pose.y = y;
        self.pose.theta = theta;
    }

    /// Teleports the agent to `spawn` and brings it to rest.
    ///
    /// The settled pose moves with it so collision rollback stays valid.
    pub fn reset(&mut self, spawn: Pose) {
        self.pose = spawn;
        self.settled = spawn;
        self.velocity = Velocity::default();
        self.forces = Forces::default();
    }

    /// Applies a remote participant's published state.
    pub fn apply_update(&mut self, update: &AgentUpdate) {
        self.set_pose(update.x, update.y, update.theta);
        self.forces = Forces {
            translational: update.translational_force,
            rotational: update.rotational_force,
        };
        self.updated_at = update.timestamp;
    }

    /// Captures the state published to the server.
    #[must_use]
    pub const fn to_update(&self, timestamp: u64) -> AgentUpdate {
        AgentUpdate {
            id: self.id,
            x: self.pose.x,
            y: self.pose.y,
            theta: self.pose.theta,
            translational_force: self.forces.translational,
            rotational_force: self.forces.rotational,
            timestamp,
        }
    }
}

/// Shared, lock-guarded reference to an [`Agent`].
///
/// Every read or write from a thread other than the owner goes through
/// [`AgentHandle::lock`]; guards should live only long enough to copy or
/// apply fields.
#[derive(Clone)]
pub struct AgentHandle {
    id: ParticipantId,
    inner: Arc<Mutex<Agent>>,
}

impl AgentHandle {
    /// Wraps an agent for sharing.
    #[must_use]
    pub fn new(agent: Agent) -> Self {
        Self {
            id: agent.id(),
            inner: Arc::new(Mutex::new(agent)),
        }
    }

    /// Participant id, readable without taking the lock.
    #[must_use]
    pub const fn id(&self) -> ParticipantId {
        self.id
    }

    /// Acquires exclusive access to the agent.
    ///
    /// A poisoned lock is recovered: field writes never leave the record
    /// half-updated across a panic point.
    pub fn lock(&self) -> MutexGuard<'_, Agent> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether both handles refer to the same agent.
    #[must_use]
    pub fn same_agent(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for AgentHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentHandle").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};
    use std::thread;

    #[fixture]
    fn agent() -> Agent {
        Agent::new(
            3,
            AgentParams::default(),
            Pose::ground(5.0, 6.0, 0.25),
            Texture::new(vec![1, 2, 3]),
        )
    }

    #[rstest]
    fn new_agent_is_new_and_at_rest(agent: Agent) {
        assert!(agent.is_new());
        assert_eq!(agent.velocity(), Velocity::default());
        assert_eq!(agent.forces(), Forces::default());
        assert_eq!(agent.settled_pose(), agent.pose());
        assert_eq!(agent.updated_at(), 0);
    }

    #[rstest]
    fn accumulators_are_unbounded_until_consumed(mut agent: Agent) {
        for _ in 0..5 {
            agent.increase_translational_force(agent.params().max_translational_force);
        }
        agent.decrease_rotational_force(2.0);
        assert!(agent.forces().translational > agent.params().max_translational_force);
        assert!((agent.forces().rotational + 2.0).abs() < f32::EPSILON);
    }

    #[rstest]
    fn decay_factors_are_clamped(mut agent: Agent) {
        agent.set_forces(Forces {
            translational: 2.0,
            rotational: -2.0,
        });
        agent.decay_forces(3.0, -1.0);
        assert_eq!(agent.forces().translational, 2.0);
        assert_eq!(agent.forces().rotational, 0.0);
    }

    #[rstest]
    fn update_round_trips_through_agent(mut agent: Agent) {
        let update = AgentUpdate {
            id: 3,
            x: 1.0,
            y: 2.0,
            theta: 0.5,
            translational_force: 4.0,
            rotational_force: -0.25,
            timestamp: 99,
        };
        agent.apply_update(&update);
        assert_eq!(agent.to_update(99), update);
        assert_eq!(agent.updated_at(), 99);
    }

    #[rstest]
    fn reset_brings_agent_to_rest(mut agent: Agent) {
        agent.increase_translational_force(3.0);
        agent.set_velocity(Velocity {
            translational: 1.0,
            rotational: 1.0,
        });
        agent.is_new = false;
        let spawn = Pose::ground(1.0, 1.0, 0.0);
        agent.reset(spawn);
        assert_eq!(agent.pose(), spawn);
        assert_eq!(agent.settled_pose(), spawn);
        assert_eq!(agent.velocity(), Velocity::default());
        assert_eq!(agent.forces(), Forces::default());
        assert!(!agent.is_new(), "reset never re-enters the new state");
    }

    #[rstest]
    fn handle_serialises_concurrent_writers(agent: Agent) {
        let handle = AgentHandle::new(agent);
        let workers: Vec<_> = (0..4)
            .map(|_| {
                let shared = handle.clone();
                thread::spawn(move || {
                    for _ in 0..250 {
                        shared.lock().increase_translational_force(1.0);
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().expect("worker panicked");
        }
        assert!((handle.lock().forces().translational - 1000.0).abs() < f32::EPSILON);
    }

    #[rstest]
    fn handle_recovers_from_poisoning(agent: Agent) {
        let handle = AgentHandle::new(agent);
        let poisoner = handle.clone();
        let outcome = thread::spawn(move || {
            let _guard = poisoner.lock();
            panic!("poison the agent lock");
        })
        .join();
        assert!(outcome.is_err());
        assert_eq!(handle.lock().id(), 3);
        assert_eq!(handle.id(), 3);
    }
}

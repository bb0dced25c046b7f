//! Pairwise proximity checks with rollback to the settled pose.

use log::debug;

use crate::agent::{Agent, Forces, Pose, Velocity};
use crate::COLLISION_RANGE;

/// Axis-aligned box test on the ground plane.
///
/// # Examples
/// ```
/// use trundle::agent::Pose;
/// use trundle::collision::within_range;
/// assert!(within_range(&Pose::ground(0.0, 0.0, 0.0), &Pose::ground(1.0, 1.0, 0.0)));
/// assert!(!within_range(&Pose::ground(0.0, 0.0, 0.0), &Pose::ground(0.0, 1.5, 0.0)));
/// ```
#[must_use]
pub fn within_range(a: &Pose, b: &Pose) -> bool {
    (a.x - b.x).abs() < COLLISION_RANGE && (a.y - b.y).abs() < COLLISION_RANGE
}

/// Resolves a collision of `a` against `b`, correcting only `a`.
///
/// Returns whether the agents were near each other. `a` is rolled back to
/// its settled pose and stopped when neither agent is new and the settled
/// pose clears `b`; otherwise nothing is mutated. Mutual collisions need a
/// second call with the arguments swapped.
pub fn resolve(a: &mut Agent, b: &Agent) -> bool {
    if !within_range(&a.pose, &b.pose) {
        return false;
    }
    // Fresh agents have no settled pose worth restoring yet.
    if a.is_new || b.is_new {
        return true;
    }
    if within_range(&a.settled, &b.pose) {
        return true;
    }
    debug!(
        "agent {} collided with agent {}, rolling back to ({:.3}, {:.3})",
        a.id(),
        b.id(),
        a.settled.x,
        a.settled.y
    );
    a.pose = a.settled;
    a.forces = Forces::default();
    a.velocity = Velocity::default();
    true
}

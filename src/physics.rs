//! Terrain-conforming integration of agent motion.
//!
//! [`advance`] moves an agent one step along its forward axis, conforms the
//! result to the terrain, then integrates velocities from the clamped
//! control input plus the gravity component along the slope. Viscosity is a
//! per-step exponential decay rather than physical drag.

use log::trace;

use crate::agent::{Agent, Pose};
use crate::surface::Surface;
use crate::vector_math::{forward_axis, translation};
use crate::GRAVITY;

/// Why an integration step was not applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// The time step was not a positive finite number; nothing changed.
    InvalidStep,
    /// The agent's current pose is off the terrain; velocities were zeroed.
    CurrentOffTerrain,
    /// The move would leave the terrain; nothing changed.
    CandidateOffTerrain,
}

/// Result of one call to [`advance`].
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Pose and velocities were updated.
    Advanced,
    /// The step was discarded. Callers must not retry within the same tick.
    Rejected(Rejection),
}

impl StepOutcome {
    /// Whether the step was applied.
    #[must_use]
    pub const fn is_advanced(self) -> bool {
        matches!(self, Self::Advanced)
    }
}

/// Returns `force` with magnitudes below `dead_zone` snapped to zero.
///
/// # Examples
/// ```
/// use trundle::physics::apply_dead_zone;
/// assert_eq!(apply_dead_zone(0.04, 0.05), 0.0);
/// assert_eq!(apply_dead_zone(-0.2, 0.05), -0.2);
/// ```
#[must_use]
pub fn apply_dead_zone(force: f32, dead_zone: f32) -> f32 {
    if force.abs() < dead_zone {
        0.0
    } else {
        force
    }
}

fn clamp_force(force: f32, max: f32) -> f32 {
    if force.is_nan() {
        0.0
    } else {
        force.clamp(-max, max)
    }
}

/// Advances `agent` by `dt` seconds over `surface`.
///
/// Pending forces are clamped to the agent's maxima before use but the
/// accumulators themselves are left untouched; a NaN force counts as zero.
/// A non-finite velocity is zeroed before the step. On success the
/// pre-step pose becomes the agent's settled pose and the agent leaves its
/// "new" state.
pub fn advance(agent: &mut Agent, surface: &dyn Surface, dt: f32) -> StepOutcome {
    if !(dt.is_finite() && dt > 0.0) {
        return StepOutcome::Rejected(Rejection::InvalidStep);
    }
    let params = *agent.params();
    let translational_force =
        clamp_force(agent.forces.translational, params.max_translational_force);
    let rotational_force = clamp_force(agent.forces.rotational, params.max_rotational_force);
    if !(agent.velocity.translational.is_finite() && agent.velocity.rotational.is_finite()) {
        agent.velocity.translational = 0.0;
        agent.velocity.rotational = 0.0;
    }

    let Pose { x, y, theta, .. } = agent.pose;
    let Some(current) = surface.transform(x, y, theta) else {
        agent.velocity.translational = 0.0;
        agent.velocity.rotational = 0.0;
        return StepOutcome::Rejected(Rejection::CurrentOffTerrain);
    };

    // Agents only ever move along their heading.
    let forward = forward_axis(&current);
    let origin = translation(&current);
    let next_x = origin.x + forward.x * agent.velocity.translational * dt;
    let next_y = origin.y + forward.y * agent.velocity.translational * dt;
    let Some(landing) = surface.transform(next_x, next_y, theta) else {
        return StepOutcome::Rejected(Rejection::CandidateOffTerrain);
    };
    let next_theta = theta + agent.velocity.rotational * dt;
    let Some(oriented) = surface.transform(next_x, next_y, next_theta) else {
        return StepOutcome::Rejected(Rejection::CandidateOffTerrain);
    };
    let Some(inverse) = surface.inverse_transform(next_x, next_y, next_theta) else {
        return StepOutcome::Rejected(Rejection::CandidateOffTerrain);
    };

    let landed = translation(&landing);
    agent.settled = agent.pose;
    agent.pose = Pose {
        x: landed.x,
        y: landed.y,
        z: landed.z,
        theta: next_theta,
    };

    let slope_pull = -GRAVITY * forward_axis(&oriented).z;
    let driving = apply_dead_zone(
        slope_pull + translational_force,
        params.min_translational_force,
    );
    let turning = apply_dead_zone(rotational_force, params.min_rotational_force);
    agent.velocity.translational += driving * dt;
    agent.velocity.rotational += turning * dt;
    agent.velocity.translational *= params.translational_viscosity;
    agent.velocity.rotational *= params.rotational_viscosity;

    agent.camera_to_world = oriented;
    agent.world_to_camera = inverse;
    agent.is_new = false;
    trace!(
        "agent {} advanced to ({:.3}, {:.3}, {:.3}) heading {:.3}",
        agent.id(),
        agent.pose.x,
        agent.pose.y,
        agent.pose.z,
        agent.pose.theta
    );
    StepOutcome::Advanced
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{Forces, Texture, Velocity};
    use crate::config::AgentParams;
    use crate::surface::{Heightfield, MockSurface};
    use crate::vector_math::conformed_frame;
    use approx::assert_relative_eq;
    use glam::Vec3;
    use rstest::{fixture, rstest};

    #[fixture]
    fn flat() -> Heightfield {
        Heightfield::flat(21, 21, 1.0, 1.0, 0.0).expect("valid terrain")
    }

    fn agent_with(params: AgentParams, x: f32, y: f32, theta: f32) -> Agent {
        Agent::new(1, params, Pose::ground(x, y, theta), Texture::default())
    }

    fn agent_at(x: f32, y: f32, theta: f32) -> Agent {
        agent_with(AgentParams::default(), x, y, theta)
    }

    #[rstest]
    #[case(0.0)]
    #[case(-0.1)]
    #[case(f32::NAN)]
    fn invalid_steps_change_nothing(flat: Heightfield, #[case] dt: f32) {
        let mut agent = agent_at(5.0, 5.0, 0.0);
        agent.increase_translational_force(5.0);
        assert_eq!(
            advance(&mut agent, &flat, dt),
            StepOutcome::Rejected(Rejection::InvalidStep)
        );
        assert!(agent.is_new());
        assert_eq!(agent.velocity(), Velocity::default());
    }

    #[rstest]
    fn rest_is_a_fixed_point(flat: Heightfield) {
        let mut agent = agent_at(5.0, 7.0, 0.3);
        assert!(advance(&mut agent, &flat, 0.1).is_advanced());
        let first = agent.pose();
        assert!(advance(&mut agent, &flat, 0.1).is_advanced());
        let second = agent.pose();
        assert_relative_eq!(first.x, second.x);
        assert_relative_eq!(first.y, second.y);
        assert_relative_eq!(first.z, second.z);
        assert_relative_eq!(first.theta, second.theta);
        assert_eq!(agent.velocity(), Velocity::default());
    }

    #[rstest]
    #[case::positive(1_000.0, 10.0)]
    #[case::negative(-1_000.0, -10.0)]
    fn translational_force_is_clamped_before_use(
        flat: Heightfield,
        #[case] pushed: f32,
        #[case] expected: f32,
    ) {
        let params = AgentParams {
            translational_viscosity: 1.0,
            ..AgentParams::default()
        };
        let mut agent = agent_with(params, 10.0, 10.0, 0.0);
        agent.increase_translational_force(pushed);
        let dt = 0.25;
        assert!(advance(&mut agent, &flat, dt).is_advanced());
        assert_relative_eq!(agent.velocity().translational, expected * dt);
        assert_relative_eq!(agent.forces().translational, pushed);
    }

    #[rstest]
    fn rotational_force_is_clamped_before_use(flat: Heightfield) {
        let params = AgentParams {
            rotational_viscosity: 1.0,
            ..AgentParams::default()
        };
        let mut agent = agent_with(params, 10.0, 10.0, 0.0);
        agent.increase_rotational_force(50.0);
        assert!(advance(&mut agent, &flat, 1.0).is_advanced());
        assert_relative_eq!(agent.velocity().rotational, params.max_rotational_force);
    }

    #[rstest]
    fn forces_inside_dead_zone_do_nothing(flat: Heightfield) {
        let mut agent = agent_at(10.0, 10.0, 0.0);
        agent.set_forces(Forces {
            translational: 0.04,
            rotational: -0.04,
        });
        assert!(advance(&mut agent, &flat, 1.0).is_advanced());
        assert_eq!(agent.velocity(), Velocity::default());
    }

    #[rstest]
    fn off_terrain_current_pose_freezes_agent(flat: Heightfield) {
        let mut agent = agent_at(-3.0, 4.0, 0.5);
        agent.set_velocity(Velocity {
            translational: 2.0,
            rotational: 1.0,
        });
        let before = agent.pose();
        assert_eq!(
            advance(&mut agent, &flat, 0.5),
            StepOutcome::Rejected(Rejection::CurrentOffTerrain)
        );
        assert_eq!(agent.pose(), before);
        assert_eq!(agent.velocity(), Velocity::default());
        assert!(agent.is_new());
    }

    #[rstest]
    fn move_off_the_edge_is_discarded(flat: Heightfield) {
        let mut agent = agent_at(19.5, 10.0, 0.0);
        let velocity = Velocity {
            translational: 4.0,
            rotational: 0.2,
        };
        agent.set_velocity(velocity);
        let before = agent.pose();
        let settled = agent.settled_pose();
        assert_eq!(
            advance(&mut agent, &flat, 1.0),
            StepOutcome::Rejected(Rejection::CandidateOffTerrain)
        );
        assert_eq!(agent.pose().x.to_bits(), before.x.to_bits());
        assert_eq!(agent.pose().y.to_bits(), before.y.to_bits());
        assert_eq!(agent.pose().theta.to_bits(), before.theta.to_bits());
        assert_eq!(agent.settled_pose(), settled);
        assert_eq!(agent.velocity(), velocity);
    }

    #[rstest]
    fn step_moves_along_heading_and_turns(flat: Heightfield) {
        let mut agent = agent_at(10.0, 10.0, std::f32::consts::FRAC_PI_2);
        agent.set_velocity(Velocity {
            translational: 2.0,
            rotational: 0.5,
        });
        assert!(advance(&mut agent, &flat, 1.0).is_advanced());
        let pose = agent.pose();
        assert_relative_eq!(pose.x, 10.0, epsilon = 1e-5);
        assert_relative_eq!(pose.y, 12.0, epsilon = 1e-5);
        assert_relative_eq!(pose.theta, std::f32::consts::FRAC_PI_2 + 0.5);
        assert_eq!(agent.settled_pose(), Pose::ground(10.0, 10.0, std::f32::consts::FRAC_PI_2));
        assert!(!agent.is_new());
    }

    #[rstest]
    fn gravity_pulls_downhill() {
        // Terrain rising one unit per unit of x; facing uphill.
        let ramp = Heightfield::from_fn(21, 21, 1.0, 1.0, |row, _| {
            crate::numeric::index_to_f32(row)
        })
        .expect("valid ramp");
        let mut agent = agent_at(10.0, 10.0, 0.0);
        assert!(advance(&mut agent, &ramp, 1.0).is_advanced());
        let expected = -GRAVITY * std::f32::consts::FRAC_1_SQRT_2 * 0.5;
        assert_relative_eq!(agent.velocity().translational, expected, epsilon = 1e-5);
    }

    #[rstest]
    fn frames_are_stored_after_a_step() {
        let mut surface = MockSurface::new();
        surface
            .expect_transform()
            .times(3)
            .returning(|x, y, heading| conformed_frame(Vec3::new(x, y, 1.0), Vec3::Z, heading));
        surface
            .expect_inverse_transform()
            .times(1)
            .returning(|x, y, heading| {
                conformed_frame(Vec3::new(x, y, 1.0), Vec3::Z, heading).map(|frame| frame.inverse())
            });
        let mut agent = agent_at(1.0, 2.0, 0.0);
        assert!(advance(&mut agent, &surface, 1.0).is_advanced());
        assert_relative_eq!(agent.pose().z, 1.0);
        assert!((agent.world_to_camera() * agent.camera_to_world())
            .abs_diff_eq(glam::Mat4::IDENTITY, 1e-6));
    }

    #[rstest]
    fn third_query_failure_leaves_agent_unmutated() {
        let mut surface = MockSurface::new();
        let mut calls = 0;
        surface.expect_transform().returning(move |x, y, heading| {
            calls += 1;
            (calls < 3).then(|| conformed_frame(Vec3::new(x, y, 0.0), Vec3::Z, heading))?
        });
        let mut agent = agent_at(1.0, 2.0, 0.0);
        agent.set_velocity(Velocity {
            translational: 1.0,
            rotational: 1.0,
        });
        let before = agent.pose();
        assert_eq!(
            advance(&mut agent, &surface, 1.0),
            StepOutcome::Rejected(Rejection::CandidateOffTerrain)
        );
        assert_eq!(agent.pose(), before);
        assert!(agent.is_new());
    }

    #[rstest]
    fn failed_inverse_query_leaves_agent_unmutated() {
        let mut surface = MockSurface::new();
        surface
            .expect_transform()
            .returning(|x, y, heading| conformed_frame(Vec3::new(x, y, 0.0), Vec3::Z, heading));
        surface.expect_inverse_transform().times(1).returning(|_, _, _| None);
        let mut agent = agent_at(1.0, 2.0, 0.0);
        agent.set_velocity(Velocity {
            translational: 1.0,
            rotational: 0.0,
        });
        let before = agent.pose();
        assert_eq!(
            advance(&mut agent, &surface, 1.0),
            StepOutcome::Rejected(Rejection::CandidateOffTerrain)
        );
        assert_eq!(agent.pose(), before);
    }

    #[rstest]
    #[case::nan_translational(f32::NAN, 0.0)]
    #[case::nan_rotational(0.0, f32::NAN)]
    #[case::nan_both(f32::NAN, f32::NAN)]
    fn nan_forces_count_as_zero(
        flat: Heightfield,
        #[case] translational: f32,
        #[case] rotational: f32,
    ) {
        let mut agent = agent_at(10.0, 10.0, 0.0);
        agent.set_forces(Forces {
            translational,
            rotational,
        });
        assert!(advance(&mut agent, &flat, 0.1).is_advanced());
        assert_eq!(agent.velocity(), Velocity::default());
        assert!(advance(&mut agent, &flat, 0.1).is_advanced());
    }

    #[rstest]
    #[case::positive(f32::INFINITY, 10.0)]
    #[case::negative(f32::NEG_INFINITY, -10.0)]
    fn infinite_forces_clamp_to_the_maximum(
        flat: Heightfield,
        #[case] translational: f32,
        #[case] expected: f32,
    ) {
        let params = AgentParams {
            translational_viscosity: 1.0,
            ..AgentParams::default()
        };
        let mut agent = agent_with(params, 10.0, 10.0, 0.0);
        agent.set_forces(Forces {
            translational,
            rotational: 0.0,
        });
        assert!(advance(&mut agent, &flat, 0.5).is_advanced());
        assert_relative_eq!(agent.velocity().translational, expected * 0.5);
    }

    #[rstest]
    #[case::nan(f32::NAN)]
    #[case::infinite(f32::INFINITY)]
    fn non_finite_velocity_does_not_freeze_the_agent(flat: Heightfield, #[case] speed: f32) {
        let mut agent = agent_at(10.0, 10.0, 0.0);
        agent.set_velocity(Velocity {
            translational: speed,
            rotational: speed,
        });
        assert!(advance(&mut agent, &flat, 0.1).is_advanced());
        assert_eq!(agent.velocity(), Velocity::default());
        assert!(agent.pose().x.is_finite());
        assert_relative_eq!(agent.pose().x, 10.0);
    }

    #[rstest]
    #[case::nan_x(f32::NAN, 5.0, 0.0)]
    #[case::infinite_y(5.0, f32::INFINITY, 0.0)]
    #[case::nan_heading(5.0, 5.0, f32::NAN)]
    fn non_finite_pose_is_off_terrain(
        flat: Heightfield,
        #[case] x: f32,
        #[case] y: f32,
        #[case] theta: f32,
    ) {
        let mut agent = agent_at(x, y, theta);
        agent.set_velocity(Velocity {
            translational: 1.0,
            rotational: 1.0,
        });
        assert_eq!(
            advance(&mut agent, &flat, 0.1),
            StepOutcome::Rejected(Rejection::CurrentOffTerrain)
        );
        assert_eq!(agent.velocity(), Velocity::default());
    }
}

//! Per-frame driver run by the physics thread.
//!
//! [`LocalWorld::tick`] advances every agent, decays the local control
//! input and resolves collisions across all pairs. It is the only code that
//! holds two agent locks at once, and it always takes them in ascending
//! participant-id order.

use std::sync::Arc;

use log::debug;

use crate::agent::{AgentHandle, ParticipantId, Pose};
use crate::collision;
use crate::mirror::Mirror;
use crate::physics::{self, Rejection, StepOutcome};
use crate::surface::Surface;

/// What happened during one [`LocalWorld::tick`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Agents whose integration step was applied.
    pub advanced: usize,
    /// Agents whose step was rejected, with the reason.
    pub rejected: Vec<(ParticipantId, Rejection)>,
    /// Ordered agent pairs found within collision range.
    pub collisions: usize,
}

impl TickReport {
    /// Rejection of the given participant's step, if any.
    #[must_use]
    pub fn rejection_of(&self, id: ParticipantId) -> Option<Rejection> {
        self.rejected
            .iter()
            .find(|(rejected, _)| *rejected == id)
            .map(|&(_, reason)| reason)
    }
}

/// Terrain, local agent and mirror as seen by the physics thread.
#[derive(Clone)]
pub struct LocalWorld {
    surface: Arc<dyn Surface>,
    local: AgentHandle,
    mirror: Mirror,
    spawn: Pose,
}

impl LocalWorld {
    /// Creates a driver for `local` and the agents in `mirror`.
    ///
    /// `spawn` is where [`LocalWorld::respawn_local`] puts the local agent.
    #[must_use]
    pub const fn new(
        surface: Arc<dyn Surface>,
        local: AgentHandle,
        mirror: Mirror,
        spawn: Pose,
    ) -> Self {
        Self {
            surface,
            local,
            mirror,
            spawn,
        }
    }

    /// Handle to the local agent.
    #[must_use]
    pub const fn local(&self) -> &AgentHandle {
        &self.local
    }

    /// Mirror of remote agents.
    #[must_use]
    pub const fn mirror(&self) -> &Mirror {
        &self.mirror
    }

    /// Local agent first, then remote agents in slot order.
    fn agents(&self) -> Vec<AgentHandle> {
        let mut agents = vec![self.local.clone()];
        agents.extend(self.mirror.agents());
        agents
    }

    /// Runs one frame of `dt` seconds.
    #[must_use]
    pub fn tick(&self, dt: f32) -> TickReport {
        let mut report = TickReport::default();
        let mut agents = self.agents();

        for handle in &agents {
            let outcome = physics::advance(&mut handle.lock(), self.surface.as_ref(), dt);
            match outcome {
                StepOutcome::Advanced => report.advanced += 1,
                StepOutcome::Rejected(reason) => report.rejected.push((handle.id(), reason)),
            }
        }

        {
            let mut local = self.local.lock();
            let params = *local.params();
            local.decay_forces(
                params.translational_control_decay,
                params.rotational_control_decay,
            );
        }

        agents.sort_by_key(AgentHandle::id);
        for (position, first) in agents.iter().enumerate() {
            for second in agents.iter().skip(position + 1) {
                if first.same_agent(second) {
                    continue;
                }
                let mut low = first.lock();
                let mut high = second.lock();
                if collision::resolve(&mut low, &high) {
                    report.collisions += 1;
                }
                if collision::resolve(&mut high, &low) {
                    report.collisions += 1;
                }
            }
        }

        if !report.rejected.is_empty() {
            debug!("rejected steps: {:?}", report.rejected);
        }
        report
    }

    /// Respawns the local agent when `report` shows its step was refused
    /// for leaving the terrain.
    ///
    /// Returns whether the agent was moved.
    #[must_use]
    pub fn respawn_if_stranded(&self, report: &TickReport) -> bool {
        let stranded = matches!(
            report.rejection_of(self.local.id()),
            Some(Rejection::CurrentOffTerrain | Rejection::CandidateOffTerrain)
        );
        if stranded {
            self.respawn_local();
        }
        stranded
    }

    /// Puts the local agent back on the spawn pose, at rest.
    pub fn respawn_local(&self) {
        self.local.lock().reset(self.spawn);
        debug!(
            "participant {} respawned at ({:.3}, {:.3})",
            self.local.id(),
            self.spawn.x,
            self.spawn.y
        );
    }
}

impl std::fmt::Debug for LocalWorld {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalWorld")
            .field("local", &self.local)
            .field("mirror", &self.mirror)
            .field("spawn", &self.spawn)
            .finish_non_exhaustive()
    }
}

//! Runtime configuration for agents and the network session.
//!
//! Both structures deserialise from JSON with every field optional, so a
//! configuration file only needs to name the values it overrides. The
//! binary layers command-line flags on top of the loaded file.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{
    FRAME_STEP, MAX_PARTICIPANTS, MAX_ROTATIONAL_FORCE, MAX_TRANSLATIONAL_FORCE,
    MIN_ROTATIONAL_FORCE, MIN_TRANSLATIONAL_FORCE, PUBLISH_INTERVAL_MS, RECEIVE_TIMEOUT_MS,
    RETRY_DELAY_MS, ROTATIONAL_CONTROL_DECAY, ROTATIONAL_VISCOSITY, SERVER_PORT,
    TRANSLATIONAL_CONTROL_DECAY, TRANSLATIONAL_VISCOSITY,
};
use crate::protocol::MAX_SNAPSHOT_RECORDS;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// Path that was requested.
        path: String,
        /// Underlying I/O failure.
        source: std::io::Error,
    },
    /// The configuration file is not valid JSON for [`ClientConfig`].
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        /// Path that was requested.
        path: String,
        /// Underlying parse failure.
        source: serde_json::Error,
    },
    /// A value is outside its permitted range.
    #[error("invalid config value `{field}`: {reason}")]
    Invalid {
        /// Name of the offending field.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}

/// Force limits, dead-zones and decay factors of a single agent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentParams {
    /// Cap applied to the translational force before integration.
    pub max_translational_force: f32,
    /// Cap applied to the rotational force before integration.
    pub max_rotational_force: f32,
    /// Translational dead-zone.
    pub min_translational_force: f32,
    /// Rotational dead-zone.
    pub min_rotational_force: f32,
    /// Velocity fraction kept per step, in `[0, 1]`.
    pub translational_viscosity: f32,
    /// Angular velocity fraction kept per step, in `[0, 1]`.
    pub rotational_viscosity: f32,
    /// Factor applied to the translational control input each frame.
    pub translational_control_decay: f32,
    /// Factor applied to the rotational control input each frame.
    pub rotational_control_decay: f32,
}

impl Default for AgentParams {
    fn default() -> Self {
        Self {
            max_translational_force: MAX_TRANSLATIONAL_FORCE,
            max_rotational_force: MAX_ROTATIONAL_FORCE,
            min_translational_force: MIN_TRANSLATIONAL_FORCE,
            min_rotational_force: MIN_ROTATIONAL_FORCE,
            translational_viscosity: TRANSLATIONAL_VISCOSITY,
            rotational_viscosity: ROTATIONAL_VISCOSITY,
            translational_control_decay: TRANSLATIONAL_CONTROL_DECAY,
            rotational_control_decay: ROTATIONAL_CONTROL_DECAY,
        }
    }
}

fn check_unit(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            field,
            reason: format!("{value} is outside [0, 1]"),
        })
    }
}

fn check_limit(
    field: &'static str,
    max: f32,
    min: f32,
) -> Result<(), ConfigError> {
    if min.is_finite() && max.is_finite() && min >= 0.0 && max >= min {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            field,
            reason: format!("expected 0 <= dead-zone ({min}) <= maximum ({max})"),
        })
    }
}

impl AgentParams {
    /// Checks that every factor lies in its permitted range.
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    ///
    /// # Examples
    /// ```
    /// use trundle::config::AgentParams;
    /// assert!(AgentParams::default().validate().is_ok());
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_limit(
            "max_translational_force",
            self.max_translational_force,
            self.min_translational_force,
        )?;
        check_limit(
            "max_rotational_force",
            self.max_rotational_force,
            self.min_rotational_force,
        )?;
        check_unit("translational_viscosity", self.translational_viscosity)?;
        check_unit("rotational_viscosity", self.rotational_viscosity)?;
        check_unit(
            "translational_control_decay",
            self.translational_control_decay,
        )?;
        check_unit("rotational_control_decay", self.rotational_control_decay)
    }
}

/// Complete client configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Participant id assigned to this client.
    pub participant_id: i32,
    /// UDP endpoint of the game server.
    pub server_addr: SocketAddr,
    /// Local UDP address to bind.
    pub bind_addr: SocketAddr,
    /// Number of remote participants the mirror can hold.
    pub capacity: usize,
    /// Delay between outgoing updates, in milliseconds.
    pub publish_interval_ms: u64,
    /// Receive timeout of the reconciliation loop, in milliseconds.
    pub receive_timeout_ms: u64,
    /// Pause after a failed loop iteration, in milliseconds.
    pub retry_delay_ms: u64,
    /// Physics time step of the frame loop, in seconds.
    pub frame_step: f32,
    /// Side length of the flat terrain used by the headless client.
    pub terrain_extent: f32,
    /// Parameters of the local agent and of every mirrored agent.
    pub agent: AgentParams,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            participant_id: 1,
            server_addr: SocketAddr::from(([127, 0, 0, 1], SERVER_PORT)),
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 0)),
            capacity: MAX_PARTICIPANTS,
            publish_interval_ms: PUBLISH_INTERVAL_MS,
            receive_timeout_ms: RECEIVE_TIMEOUT_MS,
            retry_delay_ms: RETRY_DELAY_MS,
            frame_step: FRAME_STEP,
            terrain_extent: 100.0,
            agent: AgentParams::default(),
        }
    }
}

fn check_positive(field: &'static str, value: u64) -> Result<(), ConfigError> {
    if value > 0 {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            field,
            reason: "must be greater than zero".to_owned(),
        })
    }
}

impl ClientConfig {
    /// Reads a configuration from a JSON file and validates it.
    ///
    /// # Errors
    /// Returns [`ConfigError::Read`] or [`ConfigError::Parse`] when the file
    /// cannot be loaded, and [`ConfigError::Invalid`] when a value is out of
    /// range.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Checks intervals, capacity, frame step and agent parameters.
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "capacity",
                reason: "the mirror needs at least one slot".to_owned(),
            });
        }
        // Snapshots also carry the local participant.
        if self.capacity >= MAX_SNAPSHOT_RECORDS {
            return Err(ConfigError::Invalid {
                field: "capacity",
                reason: format!(
                    "{} remote agents do not fit one snapshot datagram; the limit is {}",
                    self.capacity,
                    MAX_SNAPSHOT_RECORDS - 1
                ),
            });
        }
        check_positive("publish_interval_ms", self.publish_interval_ms)?;
        check_positive("receive_timeout_ms", self.receive_timeout_ms)?;
        check_positive("retry_delay_ms", self.retry_delay_ms)?;
        if !(self.frame_step.is_finite() && self.frame_step > 0.0) {
            return Err(ConfigError::Invalid {
                field: "frame_step",
                reason: format!("{} is not a positive duration", self.frame_step),
            });
        }
        if !(self.terrain_extent.is_finite() && self.terrain_extent > 0.0) {
            return Err(ConfigError::Invalid {
                field: "terrain_extent",
                reason: format!("{} is not a positive length", self.terrain_extent),
            });
        }
        self.agent.validate()
    }

    /// Timing parameters of the network loops.
    #[must_use]
    pub const fn loop_timing(&self) -> LoopTiming {
        LoopTiming {
            publish_interval: Duration::from_millis(self.publish_interval_ms),
            receive_timeout: Duration::from_millis(self.receive_timeout_ms),
            retry_delay: Duration::from_millis(self.retry_delay_ms),
        }
    }
}

/// Cadence and back-off used by the publication and reconciliation loops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopTiming {
    /// Sleep between two outgoing updates.
    pub publish_interval: Duration,
    /// Upper bound on a single blocking receive.
    pub receive_timeout: Duration,
    /// Pause after a failed iteration.
    pub retry_delay: Duration,
}

impl Default for LoopTiming {
    fn default() -> Self {
        ClientConfig::default().loop_timing()
    }
}

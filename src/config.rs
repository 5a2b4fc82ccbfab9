use crate::error::{PlaybackError, Result};
use crate::trajectory::Side;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_JOINT_VELOCITY: f64 = 0.25; // rad/s
pub const DEFAULT_GOAL_TIME: f64 = 0.0;
pub const DEFAULT_SETTLE_BUFFER: f64 = 1.5;
pub const DEFAULT_SERVER_TIMEOUT: f64 = 10.0;
pub const DEFAULT_GRIPPER_RATE: f64 = 20.0; // Hz
pub const DEFAULT_PHASE_POLL: f64 = 0.05;
pub const DEFAULT_STOP_DRAIN: f64 = 0.1;

/// Flat parameter namespace, e.g. `left_s0_default_velocity` or `goal_time`.
///
/// Every lookup has a documented default, so a missing key is never an error.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct Params {
    values: HashMap<String, f64>,
}

impl Params {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| PlaybackError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| PlaybackError::Config(e.to_string()))
    }

    pub fn with(mut self, key: impl Into<String>, value: f64) -> Self {
        self.values.insert(key.into(), value);
        self
    }

    pub fn get_or(&self, key: &str, default: f64) -> f64 {
        self.values.get(key).copied().unwrap_or(default)
    }

    pub fn default_velocity(&self, joint: &str) -> f64 {
        self.get_or(&format!("{joint}_default_velocity"), DEFAULT_JOINT_VELOCITY)
    }

    /// Goal-time tolerance the trajectory server allows past the last point.
    pub fn goal_time(&self) -> f64 {
        self.get_or("goal_time", DEFAULT_GOAL_TIME)
    }

    pub fn settle_buffer(&self) -> f64 {
        self.get_or("settle_buffer", DEFAULT_SETTLE_BUFFER)
    }

    pub fn server_timeout(&self) -> Duration {
        seconds(self.get_or("server_timeout", DEFAULT_SERVER_TIMEOUT))
    }

    pub fn gripper_rate(&self) -> f64 {
        let rate = self.get_or("gripper_rate", DEFAULT_GRIPPER_RATE);
        if rate > 0.0 { rate } else { DEFAULT_GRIPPER_RATE }
    }

    pub fn phase_poll(&self) -> Duration {
        seconds(self.get_or("phase_poll", DEFAULT_PHASE_POLL))
    }

    pub fn stop_drain(&self) -> Duration {
        seconds(self.get_or("stop_drain", DEFAULT_STOP_DRAIN))
    }
}

/// Non-finite or negative durations collapse to zero.
pub(crate) fn seconds(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::ZERO)
}

/// Hardware description for both arms and grippers.
#[derive(Debug, Clone, Deserialize)]
pub struct RigConfig {
    pub left: ArmConfig,
    pub right: ArmConfig,
    #[serde(default = "default_control_rate")]
    pub control_rate_hz: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArmConfig {
    pub joints: Vec<String>,
    pub driver: DriverConfig,
    /// Absent means the arm carries a custom, non-positional end effector.
    #[serde(default)]
    pub gripper: Option<GripperConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DriverConfig {
    Simulated {
        #[serde(default)]
        initial: Vec<f64>,
    },
    Feetech {
        port: String,
        motor_ids: Vec<u8>,
        #[serde(default)]
        home_positions: Vec<f64>,
    },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GripperConfig {
    Simulated {
        #[serde(default)]
        initial: f64,
    },
    Feetech {
        port: String,
        motor_id: u8,
        closed: f64,
        open: f64,
    },
}

fn default_control_rate() -> f64 {
    50.0
}

impl RigConfig {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| PlaybackError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: RigConfig =
            serde_json::from_str(&text).map_err(|e| PlaybackError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if !(self.control_rate_hz > 0.0) {
            return Err(PlaybackError::Config(format!(
                "control_rate_hz must be positive, got {}",
                self.control_rate_hz
            )));
        }
        for (side, arm) in [(Side::Left, &self.left), (Side::Right, &self.right)] {
            // Recordings classify columns by name, so every joint must read
            // as belonging to its arm.
            if let Some(joint) = arm.joints.iter().find(|j| Side::of_joint(j) != Some(side)) {
                return Err(PlaybackError::Config(format!(
                    "{side} arm joint {joint:?} must be named {side}<suffix> with a three-character suffix, e.g. {side}_s0"
                )));
            }
            if let DriverConfig::Feetech { motor_ids, .. } = &arm.driver
                && motor_ids.len() != arm.joints.len()
            {
                return Err(PlaybackError::Config(format!(
                    "{side} arm lists {} joints but {} motor ids",
                    arm.joints.len(),
                    motor_ids.len()
                )));
            }
        }
        Ok(())
    }
}

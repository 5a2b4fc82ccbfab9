pub mod feetech;
pub mod simulated;
pub mod streamer;

use crate::config::{DriverConfig, GripperConfig, RigConfig};
use crate::trajectory::{LimbTrajectory, Side};
use std::collections::HashMap;
use std::error::Error;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use feetech::{FeetechBus, FeetechGripper, FeetechJoints};
use simulated::{SimulatedGripper, SimulatedJoints};
use streamer::TrajectoryStreamer;

// Type alias for concise return signatures
pub type RobotResult<T> = Result<T, Box<dyn Error>>;

/// Locks ignoring poison; a panicked holder leaves plain data behind.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Trajectory result codes reported by a goal executor.
pub mod error_code {
    pub const SUCCESSFUL: i32 = 0;
    pub const INVALID_GOAL: i32 = -1;
    pub const INVALID_JOINTS: i32 = -2;
    pub const PATH_TOLERANCE_VIOLATED: i32 = -4;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GoalState {
    Pending,
    Active,
    Succeeded,
    Preempted,
    Aborted,
}

impl GoalState {
    pub fn is_done(self) -> bool {
        matches!(
            self,
            GoalState::Succeeded | GoalState::Preempted | GoalState::Aborted
        )
    }
}

/// Progress report from an executing trajectory goal.
#[derive(Debug, Clone, PartialEq)]
pub struct TrajectoryFeedback {
    pub desired_time_from_start: f64,
    pub actual_time_from_start: f64,
    pub actual_positions: Vec<f64>,
}

/// Invoked from the executor's own thread; must return promptly.
pub type FeedbackCallback = Arc<dyn Fn(&TrajectoryFeedback) + Send + Sync>;

/// Current joint angle query for one arm.
pub trait Limb: Send + Sync {
    fn joint_names(&self) -> Vec<String>;

    fn joint_angle(&self, joint: &str) -> Option<f64>;

    fn set_torque(&self, enabled: bool) -> RobotResult<()>;
}

/// Asynchronous joint trajectory follower for one arm.
pub trait GoalExecutor: Send + Sync {
    /// Liveness probe, bounded by `timeout`.
    fn wait_for_server(&self, timeout: Duration) -> bool;

    /// Starts following `goal` and returns without waiting for it.
    fn send_goal(&self, goal: &LimbTrajectory, feedback: FeedbackCallback) -> RobotResult<()>;

    /// `None` until a goal has been sent.
    fn state(&self) -> Option<GoalState>;

    fn cancel_goal(&self);

    /// True if the goal reached a terminal state within `timeout`.
    fn wait_for_result(&self, timeout: Duration) -> bool;

    /// Result code of the finished goal, if it produced one.
    fn result(&self) -> Option<i32>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GripperKind {
    Standard,
    /// A non-positional end effector; position commands do not apply.
    Custom,
}

pub trait GripperActuator: Send + Sync {
    fn kind(&self) -> GripperKind;

    /// Position in percent open, 0..=100.
    fn command_position(&self, position: f64) -> RobotResult<()>;

    fn position(&self) -> RobotResult<f64>;

    /// True while the gripper reports a fault.
    fn error(&self) -> bool {
        false
    }

    /// Clears a reported fault.
    fn reset(&self) -> RobotResult<()> {
        Ok(())
    }
}

/// A gripper slot with nothing positional attached.
pub struct CustomGripper;

impl GripperActuator for CustomGripper {
    fn kind(&self) -> GripperKind {
        GripperKind::Custom
    }

    fn command_position(&self, _position: f64) -> RobotResult<()> {
        Ok(())
    }

    fn position(&self) -> RobotResult<f64> {
        Err("custom gripper has no position".into())
    }
}

/// Handles for one arm: angle queries, trajectory execution and gripper.
#[derive(Clone)]
pub struct Arm {
    pub limb: Arc<dyn Limb>,
    pub executor: Arc<dyn GoalExecutor>,
    pub gripper: Arc<dyn GripperActuator>,
}

#[derive(Clone)]
pub struct Rig {
    pub left: Arm,
    pub right: Arm,
}

impl Rig {
    pub fn arm(&self, side: Side) -> &Arm {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }

    /// Fully simulated rig with every joint starting at zero and both
    /// grippers standard.
    pub fn simulated(left_joints: Vec<String>, right_joints: Vec<String>, control_rate_hz: f64) -> Self {
        let arm = |joints: Vec<String>| {
            let initial = vec![0.0; joints.len()];
            let streamer = Arc::new(TrajectoryStreamer::new(
                joints,
                SimulatedJoints::new(initial),
                control_rate_hz,
            ));
            Arm {
                limb: streamer.clone(),
                executor: streamer,
                gripper: Arc::new(SimulatedGripper::new(GripperKind::Standard, 0.0)),
            }
        };
        Rig {
            left: arm(left_joints),
            right: arm(right_joints),
        }
    }

    /// Opens every configured device. Arms and grippers naming the same
    /// serial port share one bus.
    pub fn from_config(config: &RigConfig) -> RobotResult<Self> {
        let mut buses: HashMap<String, Arc<Mutex<FeetechBus>>> = HashMap::new();
        let mut open_bus = |port: &str| -> RobotResult<Arc<Mutex<FeetechBus>>> {
            if let Some(bus) = buses.get(port) {
                return Ok(bus.clone());
            }
            log::info!("opening feetech bus on {}", port);
            let bus = Arc::new(Mutex::new(FeetechBus::open(port)?));
            buses.insert(port.to_string(), bus.clone());
            Ok(bus)
        };

        let mut arms = Vec::with_capacity(2);
        for arm in [&config.left, &config.right] {
            let (limb, executor): (Arc<dyn Limb>, Arc<dyn GoalExecutor>) = match &arm.driver {
                DriverConfig::Simulated { initial } => {
                    let mut initial = initial.clone();
                    initial.resize(arm.joints.len(), 0.0);
                    let streamer = Arc::new(TrajectoryStreamer::new(
                        arm.joints.clone(),
                        SimulatedJoints::new(initial),
                        config.control_rate_hz,
                    ));
                    (streamer.clone() as Arc<dyn Limb>, streamer as Arc<dyn GoalExecutor>)
                }
                DriverConfig::Feetech {
                    port,
                    motor_ids,
                    home_positions,
                } => {
                    let mut home = home_positions.clone();
                    home.resize(motor_ids.len(), 0.0);
                    let driver = FeetechJoints::new(open_bus(port)?, motor_ids.clone(), home)?;
                    let streamer = Arc::new(TrajectoryStreamer::new(
                        arm.joints.clone(),
                        driver,
                        config.control_rate_hz,
                    ));
                    (streamer.clone() as Arc<dyn Limb>, streamer as Arc<dyn GoalExecutor>)
                }
            };
            let gripper: Arc<dyn GripperActuator> = match &arm.gripper {
                None => Arc::new(CustomGripper),
                Some(GripperConfig::Simulated { initial }) => {
                    Arc::new(SimulatedGripper::new(GripperKind::Standard, *initial))
                }
                Some(GripperConfig::Feetech {
                    port,
                    motor_id,
                    closed,
                    open,
                }) => Arc::new(FeetechGripper::new(open_bus(port)?, *motor_id, *closed, *open)?),
            };
            arms.push(Arm {
                limb,
                executor,
                gripper,
            });
        }

        let right = arms.pop().ok_or("missing right arm")?;
        let left = arms.pop().ok_or("missing left arm")?;
        Ok(Rig { left, right })
    }
}

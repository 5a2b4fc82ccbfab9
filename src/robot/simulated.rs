use super::streamer::JointDriver;
use super::{GripperActuator, GripperKind, RobotResult, lock};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// Joints that reach every commanded position instantly.
#[derive(Debug, Clone)]
pub struct SimulatedJoints {
    positions: Vec<f64>,
}

impl SimulatedJoints {
    pub fn new(initial: Vec<f64>) -> Self {
        Self { positions: initial }
    }
}

impl JointDriver for SimulatedJoints {
    fn read_positions(&mut self) -> RobotResult<Vec<f64>> {
        Ok(self.positions.clone())
    }

    fn write_positions(&mut self, positions: &[f64]) -> RobotResult<()> {
        if positions.len() != self.positions.len() {
            return Err(format!(
                "expected {} positions, got {}",
                self.positions.len(),
                positions.len()
            )
            .into());
        }
        self.positions.copy_from_slice(positions);
        Ok(())
    }
}

/// In-memory gripper keeping every position it was commanded to.
#[derive(Debug)]
pub struct SimulatedGripper {
    kind: GripperKind,
    position: Mutex<f64>,
    commands: Mutex<Vec<f64>>,
    faulted: AtomicBool,
}

impl SimulatedGripper {
    pub fn new(kind: GripperKind, initial: f64) -> Self {
        Self {
            kind,
            position: Mutex::new(initial),
            commands: Mutex::new(Vec::new()),
            faulted: AtomicBool::new(false),
        }
    }

    /// Raises or clears the fault reported by `error`.
    pub fn set_fault(&self, faulted: bool) {
        self.faulted.store(faulted, Ordering::SeqCst);
    }

    pub fn commands(&self) -> Vec<f64> {
        lock(&self.commands).clone()
    }
}

impl GripperActuator for SimulatedGripper {
    fn kind(&self) -> GripperKind {
        self.kind
    }

    fn command_position(&self, position: f64) -> RobotResult<()> {
        let position = position.clamp(0.0, 100.0);
        *lock(&self.position) = position;
        lock(&self.commands).push(position);
        Ok(())
    }

    fn position(&self) -> RobotResult<f64> {
        Ok(*lock(&self.position))
    }

    fn error(&self) -> bool {
        self.faulted.load(Ordering::SeqCst)
    }

    fn reset(&self) -> RobotResult<()> {
        self.set_fault(false);
        Ok(())
    }
}

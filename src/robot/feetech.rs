use super::streamer::JointDriver;
use super::{GripperActuator, GripperKind, RobotResult, lock};
use rustypot::servo::feetech::sts3215::Sts3215Controller;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const BAUD_RATE: u32 = 1_000_000;

/// One STS3215 serial bus, possibly shared by an arm and its gripper.
pub struct FeetechBus {
    controller: Sts3215Controller,
}

impl FeetechBus {
    pub fn open(port: &str) -> RobotResult<Self> {
        let serial_port = serialport::new(port, BAUD_RATE)
            .timeout(Duration::from_millis(100))
            .open()?;

        let controller = Sts3215Controller::new()
            .with_protocol_v1()
            .with_serial_port(serial_port);

        Ok(FeetechBus { controller })
    }

    pub fn set_torque(&mut self, ids: &[u8], enabled: bool) -> RobotResult<()> {
        self.controller
            .sync_write_torque_enable(ids, &vec![enabled; ids.len()])?;
        Ok(())
    }

    pub fn read(&mut self, ids: &[u8]) -> RobotResult<Vec<f64>> {
        let positions = self.controller.sync_read_present_position(ids)?;
        Ok(positions)
    }

    pub fn write(&mut self, ids: &[u8], positions: &[f64]) -> RobotResult<()> {
        self.controller.sync_write_goal_position(ids, positions)?;
        Ok(())
    }
}

/// Arm joints on a Feetech bus, offset by per-motor home positions.
pub struct FeetechJoints {
    bus: Arc<Mutex<FeetechBus>>,
    motor_ids: Vec<u8>,
    home_positions: Vec<f64>,
}

impl FeetechJoints {
    pub fn new(
        bus: Arc<Mutex<FeetechBus>>,
        motor_ids: Vec<u8>,
        home_positions: Vec<f64>,
    ) -> RobotResult<Self> {
        if home_positions.len() != motor_ids.len() {
            return Err("home positions must match motor ids".into());
        }
        lock(&bus).set_torque(&motor_ids, true)?;
        Ok(Self {
            bus,
            motor_ids,
            home_positions,
        })
    }
}

impl JointDriver for FeetechJoints {
    fn read_positions(&mut self) -> RobotResult<Vec<f64>> {
        let positions = lock(&self.bus).read(&self.motor_ids)?;
        Ok(positions
            .iter()
            .zip(&self.home_positions)
            .map(|(p, h)| p - h)
            .collect())
    }

    fn write_positions(&mut self, positions: &[f64]) -> RobotResult<()> {
        if positions.len() != self.motor_ids.len() {
            return Err(format!(
                "expected {} positions, got {}",
                self.motor_ids.len(),
                positions.len()
            )
            .into());
        }
        let adjusted: Vec<f64> = positions
            .iter()
            .zip(&self.home_positions)
            .map(|(p, h)| p + h)
            .collect();
        lock(&self.bus).write(&self.motor_ids, &adjusted)
    }

    fn set_torque(&mut self, enabled: bool) -> RobotResult<()> {
        lock(&self.bus).set_torque(&self.motor_ids, enabled)
    }
}

/// Single-servo gripper; 0% is the closed angle and 100% the open one.
pub struct FeetechGripper {
    bus: Arc<Mutex<FeetechBus>>,
    motor_id: u8,
    closed: f64,
    open: f64,
}

impl FeetechGripper {
    pub fn new(bus: Arc<Mutex<FeetechBus>>, motor_id: u8, closed: f64, open: f64) -> RobotResult<Self> {
        if (open - closed).abs() < f64::EPSILON {
            return Err("gripper open and closed angles must differ".into());
        }
        lock(&bus).set_torque(&[motor_id], true)?;
        Ok(Self {
            bus,
            motor_id,
            closed,
            open,
        })
    }

    fn percent_to_angle(&self, percent: f64) -> f64 {
        self.closed + (self.open - self.closed) * percent.clamp(0.0, 100.0) / 100.0
    }

    fn angle_to_percent(&self, angle: f64) -> f64 {
        (angle - self.closed) / (self.open - self.closed) * 100.0
    }
}

impl GripperActuator for FeetechGripper {
    fn kind(&self) -> GripperKind {
        GripperKind::Standard
    }

    fn command_position(&self, position: f64) -> RobotResult<()> {
        let angle = self.percent_to_angle(position);
        lock(&self.bus).write(&[self.motor_id], &[angle])
    }

    fn position(&self) -> RobotResult<f64> {
        let angles = lock(&self.bus).read(&[self.motor_id])?;
        let angle = angles.first().copied().ok_or("no reading from gripper")?;
        Ok(self.angle_to_percent(angle))
    }

    fn error(&self) -> bool {
        lock(&self.bus).read(&[self.motor_id]).is_err()
    }

    fn reset(&self) -> RobotResult<()> {
        lock(&self.bus).set_torque(&[self.motor_id], true)
    }
}

pub mod goal;
pub mod offset;
pub mod parser;

use std::fmt;

pub use goal::{GoalBuilder, PlaybackGoals};
pub use offset::start_offset;
pub use parser::{Recording, RecordedRow};

/// Reserved column carrying the left gripper's scalar position.
pub const LEFT_GRIPPER: &str = "left_gripper";
/// Reserved column carrying the right gripper's scalar position.
pub const RIGHT_GRIPPER: &str = "right_gripper";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub const BOTH: [Side; 2] = [Side::Left, Side::Right];

    /// Classifies an arm joint name by dropping its three-character suffix,
    /// so `left_s0` is a left joint while `left_gripper` is neither.
    pub fn of_joint(name: &str) -> Option<Side> {
        let stem = name.char_indices().rev().nth(2).map(|(i, _)| &name[..i])?;
        match stem {
            "left" => Some(Side::Left),
            "right" => Some(Side::Right),
            _ => None,
        }
    }

    pub fn gripper_key(self) -> &'static str {
        match self {
            Side::Left => LEFT_GRIPPER,
            Side::Right => RIGHT_GRIPPER,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Left => f.write_str("left"),
            Side::Right => f.write_str("right"),
        }
    }
}

/// Joint positions at a given time from the start of the trajectory (seconds).
#[derive(Debug, Clone, PartialEq)]
pub struct TrajectoryPoint {
    pub positions: Vec<f64>,
    pub time_from_start: f64,
}

/// One actuation channel's ordered point sequence.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LimbTrajectory {
    pub joint_names: Vec<String>,
    points: Vec<TrajectoryPoint>,
}

impl LimbTrajectory {
    pub fn new(joint_names: Vec<String>) -> Self {
        Self {
            joint_names,
            points: Vec::new(),
        }
    }

    /// A trajectory holding `positions` at t=0.
    pub fn starting_at(joint_names: Vec<String>, positions: Vec<f64>) -> Self {
        debug_assert_eq!(positions.len(), joint_names.len());
        Self {
            joint_names,
            points: vec![TrajectoryPoint {
                positions,
                time_from_start: 0.0,
            }],
        }
    }

    /// Appends a point. Returns it back if its time does not strictly exceed
    /// the last point's, leaving the trajectory untouched.
    pub fn push(&mut self, point: TrajectoryPoint) -> Result<(), TrajectoryPoint> {
        debug_assert_eq!(point.positions.len(), self.joint_names.len());
        match self.points.last() {
            Some(last) if point.time_from_start <= last.time_from_start => Err(point),
            _ => {
                self.points.push(point);
                Ok(())
            }
        }
    }

    pub fn points(&self) -> &[TrajectoryPoint] {
        &self.points
    }

    pub fn times(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.time_from_start).collect()
    }

    pub fn last_time(&self) -> f64 {
        self.points.last().map_or(0.0, |p| p.time_from_start)
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_joints_by_suffix() {
        assert_eq!(Side::of_joint("left_s0"), Some(Side::Left));
        assert_eq!(Side::of_joint("right_w2"), Some(Side::Right));
        assert_eq!(Side::of_joint("left_gripper"), None);
        assert_eq!(Side::of_joint("time"), None);
        assert_eq!(Side::of_joint("ab"), None);
    }

    #[test]
    fn push_rejects_non_increasing_time() {
        let mut traj = LimbTrajectory::new(vec!["left_s0".into()]);
        let p = |t| TrajectoryPoint {
            positions: vec![0.0],
            time_from_start: t,
        };
        assert!(traj.push(p(0.0)).is_ok());
        assert!(traj.push(p(0.5)).is_ok());
        assert!(traj.push(p(0.5)).is_err());
        assert!(traj.push(p(0.2)).is_err());
        assert_eq!(traj.times(), vec![0.0, 0.5]);
    }

    #[test]
    fn starting_point_sits_at_zero() {
        let mut traj = LimbTrajectory::starting_at(vec!["right_s0".into()], vec![0.7]);
        assert_eq!(traj.times(), vec![0.0]);
        assert_eq!(traj.points()[0].positions, vec![0.7]);
        assert!(traj
            .push(TrajectoryPoint {
                positions: vec![0.1],
                time_from_start: 0.0,
            })
            .is_err());
    }
}

use super::offset::{JointTarget, start_offset};
use super::{LimbTrajectory, Recording, Side, TrajectoryPoint};
use crate::config::Params;
use crate::error::{PlaybackError, Result};
use std::collections::HashMap;

/// The four channel trajectories of one playback, on a shared time base.
#[derive(Debug, Clone)]
pub struct PlaybackGoals {
    pub left_arm: LimbTrajectory,
    pub right_arm: LimbTrajectory,
    pub left_gripper: LimbTrajectory,
    pub right_gripper: LimbTrajectory,
    /// Time given to the move from the current pose to the first recorded one.
    pub slow_move_offset: f64,
    /// Time from start at which recorded playback proper begins.
    pub requested_start_offset: f64,
}

impl PlaybackGoals {
    pub fn arm(&self, side: Side) -> &LimbTrajectory {
        match side {
            Side::Left => &self.left_arm,
            Side::Right => &self.right_arm,
        }
    }

    pub fn gripper(&self, side: Side) -> &LimbTrajectory {
        match side {
            Side::Left => &self.left_gripper,
            Side::Right => &self.right_gripper,
        }
    }
}

/// Current joint angles keyed by joint name, taken just before building.
pub type PoseSnapshot = HashMap<String, f64>;

pub struct GoalBuilder<'a> {
    params: &'a Params,
}

impl<'a> GoalBuilder<'a> {
    pub fn new(params: &'a Params) -> Self {
        Self { params }
    }

    /// Builds all four trajectories. Each arm starts at the current pose at
    /// t=0; every recorded row is shifted by the slow-move offset.
    ///
    /// Blank cells hold the joint's previous value, so only the first row has
    /// to command every joint.
    pub fn build(&self, recording: &Recording, current: &PoseSnapshot) -> Result<PlaybackGoals> {
        let first = recording.rows.first().ok_or(PlaybackError::EmptyRecording)?;

        let arm_joints: Vec<(Side, &String)> = Side::BOTH
            .iter()
            .flat_map(|&side| recording.joints(side).iter().map(move |j| (side, j)))
            .collect();

        for name in arm_joints
            .iter()
            .map(|(_, j)| j.as_str())
            .chain(Side::BOTH.iter().map(|s| s.gripper_key()))
        {
            if !first.commands.contains_key(name) {
                return Err(PlaybackError::MissingCommand {
                    row: 0,
                    joint: name.to_string(),
                });
            }
        }

        let mut current_of = HashMap::new();
        for &(side, joint) in &arm_joints {
            let angle = current
                .get(joint)
                .copied()
                .ok_or_else(|| PlaybackError::UnknownJoint {
                    side,
                    joint: joint.clone(),
                })?;
            current_of.insert(joint.as_str(), angle);
        }

        let slow_move_offset = start_offset(
            arm_joints.iter().map(|(_, j)| JointTarget {
                joint: j,
                commanded: first.commands[j.as_str()],
                current: current_of[j.as_str()],
            }),
            self.params,
        )?;
        let requested_start_offset = slow_move_offset + first.time;

        let from_current = |joints: &[String]| {
            let positions = joints.iter().map(|j| current_of[j.as_str()]).collect();
            LimbTrajectory::starting_at(joints.to_vec(), positions)
        };
        let mut left_arm = from_current(&recording.left_joints);
        let mut right_arm = from_current(&recording.right_joints);
        let mut left_gripper = LimbTrajectory::new(vec![Side::Left.gripper_key().to_string()]);
        let mut right_gripper = LimbTrajectory::new(vec![Side::Right.gripper_key().to_string()]);

        let mut held: HashMap<&str, f64> = HashMap::new();
        for (row, recorded) in recording.rows.iter().enumerate() {
            for (joint, value) in &recorded.commands {
                held.insert(joint.as_str(), *value);
            }
            let time = recorded.time + slow_move_offset;

            for arm in [&mut left_arm, &mut right_arm] {
                let positions = arm.joint_names.iter().map(|j| held[j.as_str()]).collect();
                let previous = arm.last_time();
                if arm
                    .push(TrajectoryPoint {
                        positions,
                        time_from_start: time,
                    })
                    .is_err()
                {
                    // The first row may land exactly on the synthetic start point.
                    if row == 0 && time == previous {
                        continue;
                    }
                    return Err(PlaybackError::NonMonotonicTime {
                        row,
                        time: recorded.time,
                        previous: previous - slow_move_offset,
                    });
                }
            }

            for gripper in [&mut left_gripper, &mut right_gripper] {
                let previous = gripper.last_time();
                let positions = vec![held[gripper.joint_names[0].as_str()]];
                if gripper
                    .push(TrajectoryPoint {
                        positions,
                        time_from_start: time,
                    })
                    .is_err()
                {
                    return Err(PlaybackError::NonMonotonicTime {
                        row,
                        time: recorded.time,
                        previous: previous - slow_move_offset,
                    });
                }
            }
        }

        log::info!(
            "built goals: {} rows, slow move offset {:.3}s, requested start {:.3}s",
            recording.rows.len(),
            slow_move_offset,
            requested_start_offset
        );

        Ok(PlaybackGoals {
            left_arm,
            right_arm,
            left_gripper,
            right_gripper,
            slow_move_offset,
            requested_start_offset,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recording(text: &str) -> Recording {
        Recording::from_reader(text.as_bytes()).unwrap()
    }

    fn pose(pairs: &[(&str, f64)]) -> PoseSnapshot {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn arms_start_from_current_pose() {
        let rec = recording(
            "time,left_s0,right_s0,left_gripper,right_gripper\n\
             0.0,0.5,0.1,0,0\n\
             1.0,0.6,0.2,10,10\n",
        );
        let params = Params::default();
        let goals = GoalBuilder::new(&params)
            .build(&rec, &pose(&[("left_s0", 0.0), ("right_s0", 0.1)]))
            .unwrap();

        // 0.5 rad at 0.25 rad/s
        assert!((goals.slow_move_offset - 2.0).abs() < 1e-12);
        assert_eq!(goals.requested_start_offset, goals.slow_move_offset);

        let left = goals.left_arm.points();
        assert_eq!(left[0].positions, vec![0.0]);
        assert_eq!(left[0].time_from_start, 0.0);
        assert_eq!(goals.left_arm.times(), vec![0.0, 2.0, 3.0]);
        assert_eq!(goals.left_gripper.times(), vec![2.0, 3.0]);
        assert_eq!(goals.right_gripper.points()[1].positions, vec![10.0]);
    }

    #[test]
    fn requested_start_keeps_first_row_time() {
        // The first row's own timestamp is added on top of the slow move.
        let rec = recording(
            "time,left_s0,right_s0,left_gripper,right_gripper\n\
             0.75,0.25,0.0,0,0\n\
             1.25,0.25,0.0,0,0\n",
        );
        let params = Params::default();
        let goals = GoalBuilder::new(&params)
            .build(&rec, &pose(&[("left_s0", 0.0), ("right_s0", 0.0)]))
            .unwrap();
        assert!((goals.slow_move_offset - 1.0).abs() < 1e-12);
        assert!((goals.requested_start_offset - 1.75).abs() < 1e-12);
        assert_eq!(goals.right_arm.times(), vec![0.0, 1.75, 2.25]);
    }

    #[test]
    fn blank_cells_hold_previous_value() {
        let rec = recording(
            "time,left_s0,right_s0,left_gripper,right_gripper\n\
             0.0,0.1,0.1,50,50\n\
             0.5,,0.2,,50\n",
        );
        let params = Params::default();
        let goals = GoalBuilder::new(&params)
            .build(&rec, &pose(&[("left_s0", 0.1), ("right_s0", 0.1)]))
            .unwrap();
        assert_eq!(goals.left_arm.points().last().unwrap().positions, vec![0.1]);
        assert_eq!(goals.left_gripper.points()[1].positions, vec![50.0]);
    }

    #[test]
    fn first_row_must_command_every_joint() {
        let rec = recording(
            "time,left_s0,right_s0,left_gripper,right_gripper\n\
             0.0,,0.1,50,50\n",
        );
        let params = Params::default();
        let err = GoalBuilder::new(&params)
            .build(&rec, &pose(&[("left_s0", 0.1), ("right_s0", 0.1)]))
            .unwrap_err();
        assert!(matches!(err, PlaybackError::MissingCommand { row: 0, ref joint } if joint == "left_s0"));
    }

    #[test]
    fn unknown_current_joint_is_reported() {
        let rec = recording(
            "time,left_s0,right_s0,left_gripper,right_gripper\n\
             0.0,0.1,0.1,50,50\n",
        );
        let params = Params::default();
        let err = GoalBuilder::new(&params)
            .build(&rec, &pose(&[("left_s0", 0.1)]))
            .unwrap_err();
        assert!(matches!(err, PlaybackError::UnknownJoint { side: Side::Right, .. }));
    }

    #[test]
    fn out_of_order_rows_are_rejected() {
        let rec = recording(
            "time,left_s0,right_s0,left_gripper,right_gripper\n\
             0.0,0.1,0.1,50,50\n\
             1.0,0.1,0.1,50,50\n\
             0.5,0.1,0.1,50,50\n",
        );
        let params = Params::default();
        let err = GoalBuilder::new(&params)
            .build(&rec, &pose(&[("left_s0", 0.1), ("right_s0", 0.1)]))
            .unwrap_err();
        assert!(matches!(err, PlaybackError::NonMonotonicTime { row: 2, .. }));
    }
}

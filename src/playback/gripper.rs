use crate::robot::{GripperActuator, GripperKind};
use crate::trajectory::{LimbTrajectory, Side};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Index of the last sample at or before `elapsed`, clamped to the ends.
/// `times` must be sorted and non-empty.
pub fn sample_index(times: &[f64], elapsed: f64) -> usize {
    times
        .partition_point(|&t| t <= elapsed)
        .saturating_sub(1)
        .min(times.len().saturating_sub(1))
}

struct Channel {
    side: Side,
    gripper: Arc<dyn GripperActuator>,
    track: LimbTrajectory,
    times: Vec<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GripperReport {
    pub ticks: usize,
    /// False if the loop was halted before the last sample was played.
    pub completed: bool,
}

/// Plays both gripper tracks at a fixed rate against elapsed real time.
pub struct GripperSynchronizer {
    channels: Vec<Channel>,
    period: Duration,
}

impl GripperSynchronizer {
    pub fn new(
        left: (Arc<dyn GripperActuator>, LimbTrajectory),
        right: (Arc<dyn GripperActuator>, LimbTrajectory),
        rate_hz: f64,
    ) -> Self {
        let channels = [(Side::Left, left), (Side::Right, right)]
            .into_iter()
            .map(|(side, (gripper, track))| Channel {
                side,
                gripper,
                times: track.times(),
                track,
            })
            .collect();
        Self {
            channels,
            period: Duration::from_secs_f64(1.0 / rate_hz),
        }
    }

    fn end_time(&self) -> f64 {
        self.channels
            .iter()
            .map(|c| c.track.last_time())
            .fold(0.0, f64::max)
    }

    /// Commands each standard gripper to its sample for `elapsed`.
    pub fn command_at(&self, elapsed: f64) {
        for channel in &self.channels {
            if channel.times.is_empty() || channel.gripper.kind() == GripperKind::Custom {
                continue;
            }
            let idx = sample_index(&channel.times, elapsed);
            let position = channel.track.points()[idx].positions[0];
            if let Err(e) = channel.gripper.command_position(position) {
                log::warn!("{} gripper command failed: {}", channel.side, e);
            }
        }
    }

    /// Runs until one period past the last sample or until `halted` is true.
    /// `actual_start_offset` is the trajectory time already elapsed at call.
    pub fn run(&self, actual_start_offset: f64, halted: impl Fn() -> bool) -> GripperReport {
        let origin = Instant::now();
        let elapsed = || origin.elapsed().as_secs_f64() + actual_start_offset;
        let end = self.end_time() + self.period.as_secs_f64();

        log::debug!(
            "gripper loop starting at {:.3}s, ends at {:.3}s",
            actual_start_offset,
            end
        );

        let mut report = GripperReport::default();
        let mut now = elapsed();
        while now < end {
            if halted() {
                log::info!("gripper loop halted at {:.3}s", now);
                return report;
            }
            let tick_start = Instant::now();
            self.command_at(now);
            report.ticks += 1;

            let spent = tick_start.elapsed();
            if spent < self.period {
                thread::sleep(self.period - spent);
            }
            now = elapsed();
        }

        report.completed = true;
        log::debug!("gripper loop finished after {} ticks", report.ticks);
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::robot::simulated::SimulatedGripper;
    use crate::trajectory::TrajectoryPoint;

    fn track(samples: &[(f64, f64)]) -> LimbTrajectory {
        let mut traj = LimbTrajectory::new(vec!["gripper".into()]);
        for &(t, v) in samples {
            traj.push(TrajectoryPoint {
                positions: vec![v],
                time_from_start: t,
            })
            .unwrap();
        }
        traj
    }

    #[test]
    fn sample_index_is_a_clamped_floor() {
        let times = [0.0, 0.5, 1.0, 2.0];
        assert_eq!(sample_index(&times, -0.3), 0);
        assert_eq!(sample_index(&times, 0.0), 0);
        assert_eq!(sample_index(&times, 0.5), 1);
        assert_eq!(sample_index(&times, 0.99), 1);
        assert_eq!(sample_index(&times, 1.0), 2);
        assert_eq!(sample_index(&times, 2.0), 3);
        assert_eq!(sample_index(&times, 40.0), 3);
        assert_eq!(sample_index(&[3.0], 1.0), 0);
    }

    #[test]
    fn command_at_uses_floor_sample() {
        let left = Arc::new(SimulatedGripper::new(GripperKind::Standard, 0.0));
        let right = Arc::new(SimulatedGripper::new(GripperKind::Standard, 0.0));
        let sync = GripperSynchronizer::new(
            (left.clone(), track(&[(0.0, 50.0), (2.0, 80.0)])),
            (right.clone(), track(&[(0.0, 40.0), (2.0, 70.0)])),
            20.0,
        );
        sync.command_at(1.0);
        sync.command_at(2.5);
        assert_eq!(left.commands(), vec![50.0, 80.0]);
        assert_eq!(right.commands(), vec![40.0, 70.0]);
    }

    #[test]
    fn custom_grippers_are_skipped() {
        let left = Arc::new(SimulatedGripper::new(GripperKind::Custom, 0.0));
        let right = Arc::new(SimulatedGripper::new(GripperKind::Standard, 0.0));
        let sync = GripperSynchronizer::new(
            (left.clone(), track(&[(0.0, 10.0)])),
            (right.clone(), track(&[(0.0, 20.0)])),
            20.0,
        );
        sync.command_at(0.0);
        assert!(left.commands().is_empty());
        assert_eq!(right.commands(), vec![20.0]);
    }

    #[test]
    fn run_plays_through_and_ends_after_last_sample() {
        let left = Arc::new(SimulatedGripper::new(GripperKind::Standard, 0.0));
        let right = Arc::new(SimulatedGripper::new(GripperKind::Standard, 0.0));
        let sync = GripperSynchronizer::new(
            (left.clone(), track(&[(1.0, 0.0), (1.05, 100.0), (1.15, 100.0)])),
            (right.clone(), track(&[(1.0, 0.0), (1.05, 100.0), (1.15, 100.0)])),
            100.0,
        );
        // Start as if trajectory time 1.0 had already elapsed.
        let report = sync.run(1.0, || false);
        assert!(report.completed);
        assert!(report.ticks >= 2);
        let commands = left.commands();
        assert_eq!(commands.first(), Some(&0.0));
        assert_eq!(commands.last(), Some(&100.0));
    }

    #[test]
    fn halted_loop_sends_nothing() {
        let left = Arc::new(SimulatedGripper::new(GripperKind::Standard, 0.0));
        let right = Arc::new(SimulatedGripper::new(GripperKind::Standard, 0.0));
        let sync = GripperSynchronizer::new(
            (left.clone(), track(&[(0.0, 10.0), (5.0, 20.0)])),
            (right.clone(), track(&[(0.0, 10.0), (5.0, 20.0)])),
            20.0,
        );
        let report = sync.run(0.0, || true);
        assert!(!report.completed);
        assert_eq!(report.ticks, 0);
        assert!(left.commands().is_empty());
    }
}

use super::{
    FeedbackCallback, GoalExecutor, GoalState, Limb, RobotResult, TrajectoryFeedback, error_code,
    lock,
};
use crate::trajectory::{LimbTrajectory, TrajectoryPoint};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Low-level position access for one arm's joints, in the streamer's joint order.
pub trait JointDriver: Send + 'static {
    fn read_positions(&mut self) -> RobotResult<Vec<f64>>;

    fn write_positions(&mut self, positions: &[f64]) -> RobotResult<()>;

    /// Holding torque; with it off the arm can be moved by hand.
    fn set_torque(&mut self, _enabled: bool) -> RobotResult<()> {
        Ok(())
    }
}

#[derive(Debug, Default)]
struct GoalSlot {
    state: Option<GoalState>,
    result: Option<i32>,
    cancel_requested: bool,
}

type SharedSlot = Arc<(Mutex<GoalSlot>, Condvar)>;

/// Follows joint trajectories on a worker thread by interpolating between
/// points and writing each step to a [`JointDriver`].
pub struct TrajectoryStreamer<D: JointDriver> {
    joint_names: Vec<String>,
    driver: Arc<Mutex<D>>,
    period: Duration,
    slot: SharedSlot,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<D: JointDriver> TrajectoryStreamer<D> {
    pub fn new(joint_names: Vec<String>, driver: D, control_rate_hz: f64) -> Self {
        let rate = if control_rate_hz > 0.0 { control_rate_hz } else { 50.0 };
        Self {
            joint_names,
            driver: Arc::new(Mutex::new(driver)),
            period: Duration::from_secs_f64(1.0 / rate),
            slot: Arc::new((Mutex::new(GoalSlot::default()), Condvar::new())),
            worker: Mutex::new(None),
        }
    }

    /// Reorders a goal's points into driver joint order, or `None` if the
    /// goal does not name exactly this arm's joints.
    fn driver_order(&self, goal: &LimbTrajectory) -> Option<Vec<TrajectoryPoint>> {
        if goal.joint_names.len() != self.joint_names.len() {
            return None;
        }
        let index: Vec<usize> = self
            .joint_names
            .iter()
            .map(|name| goal.joint_names.iter().position(|g| g == name))
            .collect::<Option<_>>()?;
        Some(
            goal.points()
                .iter()
                .map(|p| TrajectoryPoint {
                    positions: index.iter().map(|&i| p.positions[i]).collect(),
                    time_from_start: p.time_from_start,
                })
                .collect(),
        )
    }

    fn reject(&self, code: i32) {
        let (slot, done) = &*self.slot;
        let mut slot = lock(slot);
        slot.state = Some(GoalState::Aborted);
        slot.result = Some(code);
        slot.cancel_requested = false;
        done.notify_all();
    }

    fn join_worker(&self) {
        if let Some(handle) = lock(&self.worker).take() {
            let _ = handle.join();
        }
    }
}

impl<D: JointDriver> Limb for TrajectoryStreamer<D> {
    fn joint_names(&self) -> Vec<String> {
        self.joint_names.clone()
    }

    fn joint_angle(&self, joint: &str) -> Option<f64> {
        let idx = self.joint_names.iter().position(|j| j == joint)?;
        match lock(&self.driver).read_positions() {
            Ok(positions) => positions.get(idx).copied(),
            Err(e) => {
                log::warn!("failed to read {}: {}", joint, e);
                None
            }
        }
    }

    fn set_torque(&self, enabled: bool) -> RobotResult<()> {
        lock(&self.driver).set_torque(enabled)
    }
}

impl<D: JointDriver> GoalExecutor for TrajectoryStreamer<D> {
    fn wait_for_server(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if lock(&self.driver).read_positions().is_ok() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(100));
        }
    }

    fn send_goal(&self, goal: &LimbTrajectory, feedback: FeedbackCallback) -> RobotResult<()> {
        // A new goal preempts whatever is running.
        self.cancel_goal();
        self.join_worker();

        if goal.is_empty() {
            self.reject(error_code::INVALID_GOAL);
            return Ok(());
        }
        let Some(points) = self.driver_order(goal) else {
            log::warn!(
                "rejecting goal for joints {:?}, expected {:?}",
                goal.joint_names,
                self.joint_names
            );
            self.reject(error_code::INVALID_JOINTS);
            return Ok(());
        };

        {
            let (slot, _) = &*self.slot;
            let mut slot = lock(slot);
            slot.state = Some(GoalState::Active);
            slot.result = None;
            slot.cancel_requested = false;
        }

        let driver = self.driver.clone();
        let slot = self.slot.clone();
        let period = self.period;
        let handle = thread::Builder::new()
            .name("trajectory-streamer".into())
            .spawn(move || follow(points, driver, slot, period, feedback))?;
        *lock(&self.worker) = Some(handle);
        Ok(())
    }

    fn state(&self) -> Option<GoalState> {
        lock(&self.slot.0).state
    }

    fn cancel_goal(&self) {
        let mut slot = lock(&self.slot.0);
        if matches!(slot.state, Some(GoalState::Active | GoalState::Pending)) {
            slot.cancel_requested = true;
        }
    }

    fn wait_for_result(&self, timeout: Duration) -> bool {
        let (slot, done) = &*self.slot;
        let guard = lock(slot);
        let (guard, _) = done
            .wait_timeout_while(guard, timeout, |s| matches!(s.state, Some(st) if !st.is_done()))
            .unwrap_or_else(|e| e.into_inner());
        guard.state.is_some_and(GoalState::is_done)
    }

    fn result(&self) -> Option<i32> {
        lock(&self.slot.0).result
    }
}

impl<D: JointDriver> Drop for TrajectoryStreamer<D> {
    fn drop(&mut self) {
        self.cancel_goal();
        self.join_worker();
    }
}

fn finish(slot: &SharedSlot, state: GoalState, result: Option<i32>) {
    let (slot, done) = &**slot;
    let mut slot = lock(slot);
    slot.state = Some(state);
    slot.result = result;
    slot.cancel_requested = false;
    done.notify_all();
}

fn follow<D: JointDriver>(
    points: Vec<TrajectoryPoint>,
    driver: Arc<Mutex<D>>,
    slot: SharedSlot,
    period: Duration,
    feedback: FeedbackCallback,
) {
    let end_time = points.last().map_or(0.0, |p| p.time_from_start);
    let start = Instant::now();

    loop {
        let tick_start = Instant::now();
        if lock(&slot.0).cancel_requested {
            log::debug!("goal preempted");
            finish(&slot, GoalState::Preempted, None);
            return;
        }

        let now = start.elapsed().as_secs_f64();
        let desired = now.min(end_time);
        let positions = interpolate(&points, desired);
        if let Err(e) = lock(&driver).write_positions(&positions) {
            log::error!("driver write failed, aborting goal: {}", e);
            finish(&slot, GoalState::Aborted, Some(error_code::PATH_TOLERANCE_VIOLATED));
            return;
        }

        feedback(&TrajectoryFeedback {
            desired_time_from_start: desired,
            actual_time_from_start: now,
            actual_positions: positions,
        });

        if now >= end_time {
            finish(&slot, GoalState::Succeeded, Some(error_code::SUCCESSFUL));
            return;
        }

        let elapsed = tick_start.elapsed();
        if elapsed < period {
            thread::sleep(period - elapsed);
        }
    }
}

/// Linear interpolation between the points bracketing `time`, holding the
/// endpoints outside the trajectory.
pub fn interpolate(points: &[TrajectoryPoint], time: f64) -> Vec<f64> {
    let next = points.partition_point(|p| p.time_from_start <= time);
    match next {
        0 => points.first().map(|p| p.positions.clone()).unwrap_or_default(),
        n if n == points.len() => points[n - 1].positions.clone(),
        n => {
            let (a, b) = (&points[n - 1], &points[n]);
            let span = b.time_from_start - a.time_from_start;
            let s = (time - a.time_from_start) / span;
            a.positions
                .iter()
                .zip(&b.positions)
                .map(|(pa, pb)| pa + (pb - pa) * s)
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::robot::simulated::SimulatedJoints;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn point(positions: &[f64], t: f64) -> TrajectoryPoint {
        TrajectoryPoint {
            positions: positions.to_vec(),
            time_from_start: t,
        }
    }

    fn trajectory(names: &[&str], points: &[(&[f64], f64)]) -> LimbTrajectory {
        let mut traj = LimbTrajectory::new(names.iter().map(|s| s.to_string()).collect());
        for (pos, t) in points {
            traj.push(point(pos, *t)).unwrap();
        }
        traj
    }

    fn noop() -> FeedbackCallback {
        Arc::new(|_: &TrajectoryFeedback| {})
    }

    #[test]
    fn interpolates_between_points() {
        let points = vec![point(&[0.0, 1.0], 0.0), point(&[1.0, 3.0], 1.0)];
        assert_eq!(interpolate(&points, 0.5), vec![0.5, 2.0]);
        assert_eq!(interpolate(&points, -1.0), vec![0.0, 1.0]);
        assert_eq!(interpolate(&points, 5.0), vec![1.0, 3.0]);
    }

    #[test]
    fn follows_goal_to_completion() {
        let streamer = TrajectoryStreamer::new(
            vec!["left_s0".into(), "left_s1".into()],
            SimulatedJoints::new(vec![0.0, 0.0]),
            200.0,
        );
        assert!(streamer.wait_for_server(Duration::from_millis(10)));
        assert_eq!(streamer.state(), None);

        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = ticks.clone();
        // Goal joint order differs from the driver's.
        let goal = trajectory(
            &["left_s1", "left_s0"],
            &[(&[0.0, 0.0], 0.0), (&[0.4, 0.2], 0.1)],
        );
        streamer
            .send_goal(
                &goal,
                Arc::new(move |_: &TrajectoryFeedback| {
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();

        assert!(streamer.wait_for_result(Duration::from_secs(2)));
        assert_eq!(streamer.state(), Some(GoalState::Succeeded));
        assert_eq!(streamer.result(), Some(error_code::SUCCESSFUL));
        assert!(ticks.load(Ordering::SeqCst) > 0);
        assert_eq!(streamer.joint_angle("left_s0"), Some(0.2));
        assert_eq!(streamer.joint_angle("left_s1"), Some(0.4));
    }

    #[test]
    fn cancel_preempts_running_goal() {
        let streamer =
            TrajectoryStreamer::new(vec!["right_s0".into()], SimulatedJoints::new(vec![0.0]), 100.0);
        let goal = trajectory(&["right_s0"], &[(&[0.0], 0.0), (&[1.0], 10.0)]);
        streamer.send_goal(&goal, noop()).unwrap();
        assert_eq!(streamer.state(), Some(GoalState::Active));

        streamer.cancel_goal();
        assert!(streamer.wait_for_result(Duration::from_secs(1)));
        assert_eq!(streamer.state(), Some(GoalState::Preempted));
        assert_eq!(streamer.result(), None);
    }

    #[test]
    fn mismatched_joints_are_rejected() {
        let streamer =
            TrajectoryStreamer::new(vec!["right_s0".into()], SimulatedJoints::new(vec![0.0]), 100.0);
        let goal = trajectory(&["right_s1"], &[(&[0.0], 0.0)]);
        streamer.send_goal(&goal, noop()).unwrap();
        assert!(streamer.wait_for_result(Duration::from_millis(10)));
        assert_eq!(streamer.state(), Some(GoalState::Aborted));
        assert_eq!(streamer.result(), Some(error_code::INVALID_JOINTS));
    }

    #[test]
    fn wait_without_goal_times_out_false() {
        let streamer =
            TrajectoryStreamer::new(vec!["right_s0".into()], SimulatedJoints::new(vec![0.0]), 100.0);
        assert!(!streamer.wait_for_result(Duration::from_millis(5)));
    }
}

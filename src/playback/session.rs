use super::gripper::{GripperReport, GripperSynchronizer};
use super::phase::PhaseDetector;
use super::ShutdownSignal;
use crate::config::{Params, seconds};
use crate::error::{PlaybackError, Result};
use crate::robot::{GoalExecutor, GoalState, GripperKind, Rig, error_code};
use crate::trajectory::goal::PoseSnapshot;
use crate::trajectory::{GoalBuilder, PlaybackGoals, Recording, Side};
use std::path::Path;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// One playback of one recording on a rig.
///
/// Lifecycle: [`connect`](Self::connect), [`load`](Self::load) or
/// [`parse_file`](Self::parse_file), [`start`](Self::start), then
/// [`wait`](Self::wait) or [`stop`](Self::stop). A session is not reused;
/// build a new one for every playback.
pub struct PlaybackSession {
    rig: Rig,
    params: Params,
    shutdown: ShutdownSignal,
    /// Session-local stop for the gripper loop, raised by `stop` and on drop.
    halt: ShutdownSignal,
    goals: Option<PlaybackGoals>,
    detector: Option<Arc<PhaseDetector>>,
    gripper_task: Option<JoinHandle<GripperReport>>,
}

impl PlaybackSession {
    /// Confirms both trajectory servers respond and clears gripper faults
    /// before anything is sent.
    pub fn connect(rig: Rig, params: Params, shutdown: ShutdownSignal) -> Result<Self> {
        let timeout = params.server_timeout();
        for side in Side::BOTH {
            if !rig.arm(side).executor.wait_for_server(timeout) {
                log::error!(
                    "{} action server not available. Verify action server availability.",
                    side
                );
                return Err(PlaybackError::ServerUnavailable { side, timeout });
            }
        }
        log::info!("both trajectory servers available");

        for side in Side::BOTH {
            let gripper = &rig.arm(side).gripper;
            if gripper.kind() == GripperKind::Standard && gripper.error() {
                log::warn!("{} gripper reports a fault, resetting", side);
                if let Err(e) = gripper.reset() {
                    log::error!("{} gripper reset failed: {}", side, e);
                }
            }
        }

        Ok(Self {
            rig,
            params,
            shutdown,
            halt: ShutdownSignal::new(),
            goals: None,
            detector: None,
            gripper_task: None,
        })
    }

    pub fn parse_file(&mut self, path: impl AsRef<Path>) -> Result<&PlaybackGoals> {
        let recording = Recording::from_path(path)?;
        self.load(&recording)
    }

    /// Builds the four channel trajectories from the robot's current pose.
    pub fn load(&mut self, recording: &Recording) -> Result<&PlaybackGoals> {
        let mut current = PoseSnapshot::new();
        for side in Side::BOTH {
            let limb = &self.rig.arm(side).limb;
            let recorded = recording.joints(side);
            let uncovered: Vec<String> = limb
                .joint_names()
                .into_iter()
                .filter(|j| !recorded.contains(j))
                .collect();
            if !uncovered.is_empty() {
                return Err(PlaybackError::UncoveredJoints {
                    side,
                    joints: uncovered,
                });
            }
            for joint in recording.joints(side) {
                let angle = limb
                    .joint_angle(joint)
                    .ok_or_else(|| PlaybackError::UnknownJoint {
                        side,
                        joint: joint.clone(),
                    })?;
                current.insert(joint.clone(), angle);
            }
        }

        let goals = GoalBuilder::new(&self.params).build(recording, &current)?;
        self.detector = Some(Arc::new(PhaseDetector::new(goals.requested_start_offset)));
        Ok(self.goals.insert(goals))
    }

    pub fn goals(&self) -> Option<&PlaybackGoals> {
        self.goals.as_ref()
    }

    /// Observed trajectory time at which recorded playback began, once known.
    pub fn actual_start_offset(&self) -> Option<f64> {
        self.detector.as_ref().and_then(|d| d.get())
    }

    /// Upper bound on how long the arms may take, including the move to start.
    pub fn timeout(&self) -> Option<Duration> {
        let goals = self.goals.as_ref()?;
        let last_time = goals.left_arm.last_time().max(goals.right_arm.last_time());
        Some(seconds(
            goals.slow_move_offset + last_time + self.params.goal_time() + self.params.settle_buffer(),
        ))
    }

    /// Sends both arm goals with the phase detector attached as feedback.
    /// Returns as soon as both goals are accepted.
    pub fn dispatch(&mut self) -> Result<()> {
        let goals = self.goals.as_ref().ok_or(PlaybackError::NotLoaded)?;
        let detector = self.detector.as_ref().ok_or(PlaybackError::NotLoaded)?;

        for side in Side::BOTH {
            let executor = &self.rig.arm(side).executor;
            if let Err(e) = executor.send_goal(goals.arm(side), detector.feedback_callback()) {
                if side == Side::Right {
                    self.rig.left.executor.cancel_goal();
                }
                return Err(PlaybackError::Dispatch {
                    side,
                    reason: e.to_string(),
                });
            }
        }
        log::info!(
            "dispatched arm goals ({} left points, {} right points)",
            goals.left_arm.len(),
            goals.right_arm.len()
        );
        Ok(())
    }

    /// Dispatches both arms, waits for the recorded part of the trajectory to
    /// begin, then starts the gripper loop phase-locked to it.
    ///
    /// Returns false if playback never began: shutdown, both arms finishing
    /// early, or the trajectory timeout passing first.
    pub fn start(&mut self) -> Result<bool> {
        self.dispatch()?;
        let detector = self.detector.clone().ok_or(PlaybackError::NotLoaded)?;
        let timeout = self.timeout().ok_or(PlaybackError::NotLoaded)?;

        let left = self.rig.left.executor.clone();
        let right = self.rig.right.executor.clone();
        let arms_done = || {
            left.state().is_some_and(GoalState::is_done)
                && right.state().is_some_and(GoalState::is_done)
        };
        let shutdown = self.shutdown.clone();
        let halt = self.halt.clone();

        let Some(actual_offset) = detector.wait_started(self.params.phase_poll(), timeout, || {
            shutdown.is_triggered() || halt.is_triggered() || arms_done()
        }) else {
            log::warn!("trajectory playback never started; grippers not driven");
            return Ok(false);
        };

        let goals = self.goals.as_ref().ok_or(PlaybackError::NotLoaded)?;
        let synchronizer = GripperSynchronizer::new(
            (self.rig.left.gripper.clone(), goals.left_gripper.clone()),
            (self.rig.right.gripper.clone(), goals.right_gripper.clone()),
            self.params.gripper_rate(),
        );
        let handle = thread::Builder::new()
            .name("gripper-sync".into())
            .spawn(move || {
                synchronizer.run(actual_offset, || shutdown.is_triggered() || halt.is_triggered())
            })
            .map_err(PlaybackError::GripperLoop)?;
        self.gripper_task = Some(handle);
        Ok(true)
    }

    /// Waits for both arms and checks their results. A timeout, a shutdown or
    /// a failed result is logged and reported as false.
    pub fn wait(&mut self) -> bool {
        let Some(timeout) = self.timeout() else {
            log::warn!("wait called before a recording was loaded");
            return false;
        };

        let deadline = Instant::now() + timeout;
        let left = &self.rig.left.executor;
        let right = &self.rig.right.executor;
        let l_finish = self.wait_until(left.as_ref(), deadline);
        let r_finish = self.wait_until(right.as_ref(), deadline);
        let l_result = left.result() == Some(error_code::SUCCESSFUL);
        let r_result = right.result() == Some(error_code::SUCCESSFUL);

        let ok = l_finish && r_finish && l_result && r_result;
        if !ok {
            log::warn!("Trajectory action failed or did not finish before timeout/interrupt.");
            log::debug!(
                "left finished={} result={:?}, right finished={} result={:?}",
                l_finish,
                left.result(),
                r_finish,
                right.result()
            );
            self.halt.trigger();
        }
        self.join_grippers();
        ok
    }

    /// Cancels whichever arm goals are still active. Safe to call repeatedly.
    pub fn stop(&mut self) {
        for side in Side::BOTH {
            let executor = &self.rig.arm(side).executor;
            if executor.state() == Some(GoalState::Active) {
                log::info!("cancelling {} arm goal", side);
                executor.cancel_goal();
            }
        }
        // Let the cancel handshakes settle.
        thread::sleep(self.params.stop_drain());

        self.halt.trigger();
        self.join_grippers();
    }

    /// Waits in poll-sized slices so a shutdown cuts the wait short.
    fn wait_until(&self, executor: &dyn GoalExecutor, deadline: Instant) -> bool {
        if executor.state().is_none() {
            return false;
        }
        let poll = self.params.phase_poll().max(Duration::from_millis(1));
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if executor.wait_for_result(remaining.min(poll)) {
                return true;
            }
            if remaining.is_zero() || self.shutdown.is_triggered() {
                return false;
            }
        }
    }

    fn join_grippers(&mut self) {
        if let Some(handle) = self.gripper_task.take() {
            match handle.join() {
                Ok(report) => log::debug!("gripper loop report: {:?}", report),
                Err(_) => log::error!("gripper loop panicked"),
            }
        }
    }
}

impl Drop for PlaybackSession {
    fn drop(&mut self) {
        self.halt.trigger();
        self.join_grippers();
    }
}

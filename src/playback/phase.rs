use crate::robot::{FeedbackCallback, TrajectoryFeedback, lock};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// Latches the moment arm feedback first reports time past the end of the
/// move-to-start segment.
///
/// The latched value is the reported time from start, not the requested one,
/// and once set it never changes: the first crossing wins, whichever arm
/// reports it.
#[derive(Debug)]
pub struct PhaseDetector {
    requested_start_offset: f64,
    actual_start_offset: Mutex<Option<f64>>,
}

impl PhaseDetector {
    pub fn new(requested_start_offset: f64) -> Self {
        Self {
            requested_start_offset,
            actual_start_offset: Mutex::new(None),
        }
    }

    pub fn requested_start_offset(&self) -> f64 {
        self.requested_start_offset
    }

    /// Latches `reported` if it crosses the requested offset and nothing was
    /// latched yet. Returns true only for the call that latched.
    pub fn try_set_if_unset(&self, reported: f64) -> bool {
        if !(reported >= self.requested_start_offset) {
            return false;
        }
        let mut latched = lock(&self.actual_start_offset);
        if latched.is_some() {
            return false;
        }
        *latched = Some(reported);
        drop(latched);

        log::info!(
            "trajectory playback started: requested offset {:.3}s, actual {:.3}s",
            self.requested_start_offset,
            reported
        );
        true
    }

    pub fn get(&self) -> Option<f64> {
        *lock(&self.actual_start_offset)
    }

    pub fn has_started(&self) -> bool {
        self.get().is_some()
    }

    /// Feedback handler suitable for either arm's executor.
    pub fn feedback_callback(self: &Arc<Self>) -> FeedbackCallback {
        let detector = Arc::clone(self);
        Arc::new(move |feedback: &TrajectoryFeedback| {
            detector.try_set_if_unset(feedback.actual_time_from_start);
        })
    }

    /// Sleeps in `poll` steps until the phase latches, `give_up` returns true,
    /// or `timeout` passes. Returns the latched offset, if any.
    pub fn wait_started(
        &self,
        poll: Duration,
        timeout: Duration,
        give_up: impl Fn() -> bool,
    ) -> Option<f64> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(offset) = self.get() {
                return Some(offset);
            }
            if give_up() || Instant::now() >= deadline {
                // Feedback may have landed while checking.
                return self.get();
            }
            thread::sleep(poll);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;

    #[test]
    fn ignores_feedback_before_requested_offset() {
        let detector = PhaseDetector::new(1.0);
        assert!(!detector.try_set_if_unset(0.2));
        assert!(!detector.try_set_if_unset(0.999));
        assert!(!detector.has_started());
        assert!(detector.try_set_if_unset(1.0));
        assert_eq!(detector.get(), Some(1.0));
    }

    #[test]
    fn nan_feedback_never_latches() {
        let detector = PhaseDetector::new(0.5);
        assert!(!detector.try_set_if_unset(f64::NAN));
        assert!(!detector.has_started());
        assert!(detector.try_set_if_unset(0.6));
        assert_eq!(detector.get(), Some(0.6));
    }

    #[test]
    fn first_crossing_is_never_overwritten() {
        let detector = PhaseDetector::new(0.5);
        assert!(detector.try_set_if_unset(0.52));
        assert!(!detector.try_set_if_unset(0.9));
        assert!(!detector.try_set_if_unset(0.51));
        assert_eq!(detector.get(), Some(0.52));
    }

    #[test]
    fn concurrent_feedback_latches_exactly_once() {
        let detector = Arc::new(PhaseDetector::new(1.0));
        let barrier = Arc::new(Barrier::new(16));
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let detector = detector.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    let reported = 0.9 + i as f64 * 0.02;
                    barrier.wait();
                    detector.try_set_if_unset(reported).then_some(reported)
                })
            })
            .collect();

        let winners: Vec<f64> = handles
            .into_iter()
            .filter_map(|h| h.join().unwrap())
            .collect();
        assert_eq!(winners.len(), 1);
        assert_eq!(detector.get(), Some(winners[0]));
        assert!(winners[0] >= 1.0);
    }

    #[test]
    fn callback_feeds_detector() {
        let detector = Arc::new(PhaseDetector::new(0.0));
        let callback = detector.feedback_callback();
        callback(&TrajectoryFeedback {
            desired_time_from_start: 0.0,
            actual_time_from_start: 0.02,
            actual_positions: vec![],
        });
        assert_eq!(detector.get(), Some(0.02));
    }

    #[test]
    fn wait_started_gives_up() {
        let detector = PhaseDetector::new(1.0);
        let started = Instant::now();
        let got = detector.wait_started(Duration::from_millis(5), Duration::from_secs(5), || true);
        assert_eq!(got, None);
        assert!(started.elapsed() < Duration::from_secs(1));

        let got = detector.wait_started(Duration::from_millis(5), Duration::from_millis(20), || false);
        assert_eq!(got, None);
    }
}

pub mod gripper;
pub mod phase;
pub mod session;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

pub use gripper::{GripperReport, GripperSynchronizer, sample_index};
pub use phase::PhaseDetector;
pub use session::PlaybackSession;

/// Cooperative stop flag checked by every polling and control loop.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal(Arc<AtomicBool>);

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

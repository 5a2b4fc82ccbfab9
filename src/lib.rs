//! Synchronised playback of recorded dual-arm joint trajectories.
//!
//! A recording is parsed into per-limb tracks, both arms are sent to their
//! trajectory executors from the robot's current pose, and the grippers are
//! driven on their own fixed-rate loop, phase-locked to the moment arm
//! feedback reports that recorded playback has begun.

pub mod config;
pub mod error;
pub mod playback;
pub mod robot;
pub mod trajectory;

pub use config::{Params, RigConfig};
pub use error::{PlaybackError, Result};
pub use playback::{PlaybackSession, ShutdownSignal};
pub use robot::Rig;

use crate::trajectory::Side;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while building or starting a playback session. Failures
/// once the arms are moving are reported as status values instead.
#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("failed to read recording {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed recording: {0}")]
    Csv(#[from] csv::Error),

    #[error("recording has no header or no data rows")]
    EmptyRecording,

    #[error("row {row}: time column is not a number")]
    MalformedTime { row: usize },

    #[error("row {row}: time {time}s does not follow previous point at {previous}s")]
    NonMonotonicTime { row: usize, time: f64, previous: f64 },

    #[error("row {row}: no command for joint {joint}")]
    MissingCommand { row: usize, joint: String },

    #[error("recording has no {side} arm column for joints {joints:?}")]
    UncoveredJoints { side: Side, joints: Vec<String> },

    #[error("{side} limb does not report an angle for joint {joint}")]
    UnknownJoint { side: Side, joint: String },

    #[error("default velocity for {joint} must be positive, got {velocity}")]
    InvalidVelocity { joint: String, velocity: f64 },

    #[error("{side} trajectory server not available after {timeout:?}")]
    ServerUnavailable { side: Side, timeout: Duration },

    #[error("failed to send {side} goal: {reason}")]
    Dispatch { side: Side, reason: String },

    #[error("failed to spawn gripper loop: {0}")]
    GripperLoop(#[source] std::io::Error),

    #[error("no recording loaded into the session")]
    NotLoaded,

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, PlaybackError>;

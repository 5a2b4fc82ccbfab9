use crate::config::Params;
use crate::error::{PlaybackError, Result};

/// A joint's first commanded position next to where it currently is.
#[derive(Debug, Clone, Copy)]
pub struct JointTarget<'a> {
    pub joint: &'a str,
    pub commanded: f64,
    pub current: f64,
}

/// Time needed for the slowest joint to reach its first commanded position
/// at its default velocity.
pub fn start_offset<'a>(
    targets: impl IntoIterator<Item = JointTarget<'a>>,
    params: &Params,
) -> Result<f64> {
    let mut offset = 0.0_f64;
    for target in targets {
        let velocity = params.default_velocity(target.joint);
        if !(velocity > 0.0) {
            return Err(PlaybackError::InvalidVelocity {
                joint: target.joint.to_string(),
                velocity,
            });
        }
        offset = offset.max((target.commanded - target.current).abs() / velocity);
    }
    Ok(offset)
}

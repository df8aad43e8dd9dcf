pub mod calibration;
pub mod device;
pub mod host;
pub mod liveness;
pub mod status;

pub use calibration::{CalibrationState, CalibrationTiming};
pub use device::{CalibrationView, PhoneTracker, PollSettings};
pub use host::{HmdSource, JointState, TrackedJoint, TrackingDevice};
pub use liveness::{LivenessTracker, Verdict};
pub use status::{status_text, DeviceStatus};

use hiptrack_net::NetError;
use std::time::Duration;
use thiserror::Error;

/// Period of the background polling loop.
pub const TICK: Duration = Duration::from_millis(22);

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error(transparent)]
    Net(#[from] NetError),
    #[error("Failed to spawn the polling thread: {0}")]
    Spawn(std::io::Error),
    #[error("Session resources were lost after an earlier failure")]
    SessionLost,
}

use glam::{DQuat, DVec3};

/// HMD pose as reported by the host, in the host frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HmdPose {
    pub position: DVec3,
    pub rotation: DQuat,
}

impl Default for HmdPose {
    fn default() -> Self {
        Self {
            position: DVec3::ZERO,
            rotation: DQuat::IDENTITY,
        }
    }
}

/// Pose published for the virtual hip joint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackerPose {
    pub position: DVec3,
    pub rotation: DQuat,
    /// False once the stream has gone quiet; the host should stop trusting the pose.
    pub tracked: bool,
}

impl Default for TrackerPose {
    fn default() -> Self {
        Self {
            position: DVec3::ZERO,
            rotation: DQuat::IDENTITY,
            tracked: false,
        }
    }
}

/// Which calibration rotation a capture window rewrites.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureKind {
    /// Stand facing forward: captures the yaw alignment.
    Forward,
    /// Look straight down at the sensor: captures the mounting twist.
    Down,
}

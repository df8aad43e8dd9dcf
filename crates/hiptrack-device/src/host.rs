//! The surface a tracking host drives.

use crate::status::{status_text, DeviceStatus};
use glam::{DQuat, DVec3};
use hiptrack_pose::{HmdPose, TrackerPose};
use tokio::sync::watch;

/// Capabilities a host calls on a tracking device.
pub trait TrackingDevice {
    /// Start the listener (first call only) and the polling loop.
    fn initialize(&mut self);

    /// Called once per host frame: copy the latest pose into the host's joints.
    fn update(&mut self);

    /// Stop the polling loop and persist state. No tick runs after this returns.
    fn shutdown(&mut self);

    /// Ask the device behind `joint_id` for haptic feedback.
    fn signal(&mut self, joint_id: usize);

    fn status(&self) -> DeviceStatus;

    fn status_text(&self) -> String {
        status_text(self.status().code())
    }

    fn joints(&self) -> &[TrackedJoint];
}

/// Where the polling loop reads the HMD reference pose from.
pub trait HmdSource: Send + 'static {
    fn hmd_pose(&self) -> HmdPose;
}

/// A fixed HMD pose, for tests and headless runs.
impl HmdSource for HmdPose {
    fn hmd_pose(&self) -> HmdPose {
        *self
    }
}

/// The latest pose published by the host's frame loop.
impl HmdSource for watch::Receiver<HmdPose> {
    fn hmd_pose(&self) -> HmdPose {
        *self.borrow()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JointState {
    #[default]
    NotTracked,
    Tracked,
}

/// Host-side representation of one virtual joint.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedJoint {
    pub name: String,
    pub position: DVec3,
    pub rotation: DQuat,
    pub state: JointState,
}

impl TrackedJoint {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            position: DVec3::ZERO,
            rotation: DQuat::IDENTITY,
            state: JointState::NotTracked,
        }
    }

    pub fn apply(&mut self, pose: &TrackerPose) {
        self.position = pose.position;
        self.rotation = pose.rotation;
        self.state = if pose.tracked {
            JointState::Tracked
        } else {
            JointState::NotTracked
        };
    }
}

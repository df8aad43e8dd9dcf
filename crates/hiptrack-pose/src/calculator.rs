use crate::frames::{capture_anchor, forward_alignment, hmd_heading, mount_twist, to_host_frame};
use crate::predictor::{MotionSource, PositionPredictor};
use crate::types::{CaptureKind, HmdPose, TrackerPose};
use glam::{DMat3, DQuat, DVec3};
use hiptrack_config::{CalibrationOffsets, PredictionConfig};

/// Turns a raw phone orientation into the tracker pose, once per tick.
///
/// The pipeline: host-frame correction, forward (yaw) alignment, mounting
/// twist, then a translation built from the HMD position plus three offsets
/// expressed in the world, HMD and final tracker frames.
pub struct PoseCalculator {
    predictor: PositionPredictor,
    prediction: PredictionConfig,
    /// Guard hits are logged once per capture instead of every tick.
    warned_degenerate: bool,
}

impl PoseCalculator {
    pub fn new(prediction: PredictionConfig) -> Self {
        Self::with_predictor(prediction, PositionPredictor::default())
    }

    pub fn with_predictor(prediction: PredictionConfig, predictor: PositionPredictor) -> Self {
        Self {
            predictor,
            prediction,
            warned_degenerate: false,
        }
    }

    pub fn prediction(&self) -> PredictionConfig {
        self.prediction
    }

    pub fn set_prediction(&mut self, prediction: PredictionConfig) {
        if !prediction.enabled {
            self.predictor.reset();
        }
        self.prediction = prediction;
    }

    /// Compute the tracker pose.
    ///
    /// While `capture` is set, the matching calibration rotation in `offsets`
    /// is rewritten from this tick's orientation and HMD pose. Outside a
    /// capture `offsets` is only read.
    pub fn compute<M: MotionSource + ?Sized>(
        &mut self,
        raw: DQuat,
        offsets: &mut CalibrationOffsets,
        capture: Option<CaptureKind>,
        hmd: &HmdPose,
        motion: &M,
    ) -> TrackerPose {
        let hmd_basis = DMat3::from_quat(hmd.rotation);
        let device = to_host_frame(raw.normalize());

        let mut global_offset = offsets.global_offset;
        let mut device_offset = offsets.device_offset;
        let mut tracker_offset = offsets.tracker_offset;

        if capture == Some(CaptureKind::Forward) {
            match forward_alignment(device, &hmd_basis) {
                Some(alignment) => offsets.global_rotation = alignment,
                None => self.warn_degenerate("forward"),
            }
            // Show the capture pose in front of the user with no body offsets.
            if let Some(anchor) = capture_anchor(&hmd_basis) {
                global_offset = anchor;
            }
            device_offset = DVec3::ZERO;
            tracker_offset = DVec3::ZERO;
        }

        let mut rotation = offsets.global_rotation * device;

        if capture == Some(CaptureKind::Down) {
            match hmd_heading(&hmd_basis).and_then(|h| mount_twist(rotation, h)) {
                Some(twist) => offsets.local_rotation = twist,
                None => self.warn_degenerate("down"),
            }
        }

        rotation = (rotation * offsets.local_rotation).normalize();
        let tracker_basis = DMat3::from_quat(rotation);

        let mut position = hmd.position
            + global_offset
            + hmd_basis * device_offset
            + tracker_basis * tracker_offset;

        if capture != Some(CaptureKind::Forward) && self.prediction.enabled {
            position += self.predictor.predict(motion, &tracker_basis) * self.prediction.strength;
        }

        if capture.is_none() {
            self.warned_degenerate = false;
        }

        TrackerPose {
            position,
            rotation,
            tracked: true,
        }
    }

    fn warn_degenerate(&mut self, step: &str) {
        if !self.warned_degenerate {
            tracing::warn!(step, "Orientation too close to vertical, keeping previous calibration");
            self.warned_degenerate = true;
        }
    }
}

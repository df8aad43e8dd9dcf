pub mod calculator;
pub mod frames;
pub mod predictor;
pub mod types;

pub use calculator::PoseCalculator;
pub use predictor::{MotionSource, PositionPredictor, PredictorSettings};
pub use types::{CaptureKind, HmdPose, TrackerPose};

use glam::{DMat3, DVec3};
use hiptrack_net::DataChannel;
use std::collections::VecDeque;

/// Motion readings the predictor extrapolates from.
pub trait MotionSource {
    /// Angular velocity (rad/s), device frame.
    fn angular_velocity(&self) -> DVec3;
    /// Gravity-free linear acceleration (m/s^2), device frame.
    fn linear_acceleration(&self) -> DVec3;
}

impl MotionSource for DataChannel {
    fn angular_velocity(&self) -> DVec3 {
        self.sample().gyro
    }

    fn linear_acceleration(&self) -> DVec3 {
        self.sample().accel
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PredictorSettings {
    /// How far ahead the position is extrapolated (seconds).
    pub lookahead_s: f64,
    /// Pivot-to-joint lever arm in the device frame.
    pub lever_arm: DVec3,
    /// Number of angular velocity readings averaged.
    pub window: usize,
    /// Time between readings (seconds).
    pub sample_period_s: f64,
    /// Per-reading decay of the integrated linear velocity.
    pub velocity_damping: f64,
}

impl Default for PredictorSettings {
    fn default() -> Self {
        Self {
            lookahead_s: 0.044,
            lever_arm: DVec3::new(0.0, -0.75, 0.0),
            window: 4,
            sample_period_s: 0.022,
            velocity_damping: 0.85,
        }
    }
}

/// Short-horizon position extrapolator.
///
/// Each call records the current reading, so calling it has a side effect on
/// the history; callers that do not want a prediction must not call it.
pub struct PositionPredictor {
    settings: PredictorSettings,
    /// World-frame angular velocity history, newest at the back.
    history: VecDeque<DVec3>,
    /// Damped integral of world-frame linear acceleration.
    velocity: DVec3,
}

impl PositionPredictor {
    pub fn new(settings: PredictorSettings) -> Self {
        Self {
            settings,
            history: VecDeque::with_capacity(settings.window + 1),
            velocity: DVec3::ZERO,
        }
    }

    /// Predicted position delta for the joint at `basis`.
    pub fn predict<M: MotionSource + ?Sized>(&mut self, source: &M, basis: &DMat3) -> DVec3 {
        let omega = *basis * source.angular_velocity();
        if omega.is_finite() {
            self.history.push_back(omega);
            while self.history.len() > self.settings.window.max(1) {
                self.history.pop_front();
            }
        }

        let accel = *basis * source.linear_acceleration();
        if accel.is_finite() {
            self.velocity = self.velocity * self.settings.velocity_damping
                + accel * self.settings.sample_period_s;
        }

        if self.history.is_empty() {
            return self.velocity * self.settings.lookahead_s;
        }

        let mean_omega = self.history.iter().copied().sum::<DVec3>() / self.history.len() as f64;
        let arm = *basis * self.settings.lever_arm;
        let tangential = mean_omega.cross(arm);

        (tangential + self.velocity) * self.settings.lookahead_s
    }

    /// Drop all history, e.g. after the stream was lost.
    pub fn reset(&mut self) {
        self.history.clear();
        self.velocity = DVec3::ZERO;
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }
}

impl Default for PositionPredictor {
    fn default() -> Self {
        Self::new(PredictorSettings::default())
    }
}

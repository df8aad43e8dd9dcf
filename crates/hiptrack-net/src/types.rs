use glam::{DQuat, DVec3};

/// One orientation reading from the phone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrientationSample {
    /// Absolute orientation as a unit quaternion, in the phone's world frame.
    pub rotation: DQuat,
    /// Linear acceleration (m/s^2), device frame.
    pub accel: DVec3,
    /// Angular velocity (rad/s), device frame.
    pub gyro: DVec3,
}

impl Default for OrientationSample {
    fn default() -> Self {
        Self {
            rotation: DQuat::IDENTITY,
            accel: DVec3::ZERO,
            gyro: DVec3::ZERO,
        }
    }
}

impl OrientationSample {
    /// All ten wire values in packet order.
    pub fn to_array(&self) -> [f64; 10] {
        let q = self.rotation;
        [
            q.x,
            q.y,
            q.z,
            q.w,
            self.accel.x,
            self.accel.y,
            self.accel.z,
            self.gyro.x,
            self.gyro.y,
            self.gyro.z,
        ]
    }
}

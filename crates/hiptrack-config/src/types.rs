use glam::{DQuat, DVec3};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};

/// Default first port tried for the data channel.
pub const DEFAULT_DATA_PORT: u16 = 6969;
/// Fixed port the discovery responder listens on.
pub const DEFAULT_DISCOVERY_PORT: u16 = 35903;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Calibration offsets captured by the guided calibration.
    pub offsets: CalibrationOffsets,
    /// Socket setup.
    pub network: NetworkConfig,
    /// Short-horizon position prediction.
    pub prediction: PredictionConfig,
}

/// Rotation and translation offsets that place the virtual joint on the body.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationOffsets {
    /// World-space displacement added to every pose.
    #[serde(with = "dvec3_serde")]
    pub global_offset: DVec3,
    /// Fixed displacement from the HMD to the sensor mount, in the HMD frame.
    #[serde(with = "dvec3_serde")]
    pub device_offset: DVec3,
    /// Displacement from the sensor to the virtual joint, in the sensor frame.
    /// The Y component is the user-tunable hip height.
    #[serde(with = "dvec3_serde")]
    pub tracker_offset: DVec3,
    /// Yaw alignment captured by the forward calibration.
    #[serde(with = "dquat_serde")]
    pub global_rotation: DQuat,
    /// Mounting twist captured by the down calibration.
    #[serde(with = "dquat_serde")]
    pub local_rotation: DQuat,
}

impl Default for CalibrationOffsets {
    fn default() -> Self {
        Self {
            global_offset: DVec3::ZERO,
            device_offset: DVec3::new(0.0, -0.045, 0.09),
            tracker_offset: DVec3::new(0.0, -0.75, 0.0),
            global_rotation: DQuat::IDENTITY,
            local_rotation: DQuat::IDENTITY,
        }
    }
}

impl CalibrationOffsets {
    /// Offsets that leave the device orientation untouched and add no translation.
    pub fn zero() -> Self {
        Self {
            global_offset: DVec3::ZERO,
            device_offset: DVec3::ZERO,
            tracker_offset: DVec3::ZERO,
            global_rotation: DQuat::IDENTITY,
            local_rotation: DQuat::IDENTITY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// First data port tried; up to 30 higher ports are tried after it.
    pub base_port: u16,
    /// Port answering `DISCOVERY` requests.
    pub discovery_port: u16,
    /// Interface both sockets bind to.
    pub bind_address: IpAddr,
    /// Tracker name announced to the phone app.
    pub tracker_name: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            base_port: DEFAULT_DATA_PORT,
            discovery_port: DEFAULT_DISCOVERY_PORT,
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            tracker_name: "Default".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictionConfig {
    /// Whether the predicted delta is added to the tracker position.
    pub enabled: bool,
    /// Scale applied to the predicted delta.
    pub strength: f64,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            strength: 1.0,
        }
    }
}

// glam's own serde output is fine, but plain arrays keep the TOML readable.

mod dvec3_serde {
    use glam::DVec3;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(v: &DVec3, s: S) -> Result<S::Ok, S::Error> {
        [v.x, v.y, v.z].serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DVec3, D::Error> {
        let [x, y, z] = <[f64; 3]>::deserialize(d)?;
        Ok(DVec3::new(x, y, z))
    }
}

mod dquat_serde {
    use glam::DQuat;
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(q: &DQuat, s: S) -> Result<S::Ok, S::Error> {
        [q.x, q.y, q.z, q.w].serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DQuat, D::Error> {
        let [x, y, z, w] = <[f64; 4]>::deserialize(d)?;
        let q = DQuat::from_xyzw(x, y, z, w);
        let len = q.length();
        if !len.is_finite() || len < 1e-9 {
            return Err(D::Error::custom("rotation must be a non-zero quaternion"));
        }
        Ok(q / len)
    }
}

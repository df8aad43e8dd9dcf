//! Frame conventions shared by the pose pipeline and the calibration captures.
//!
//! Host frame: Y up, forward is -Z, right is +X. Headings are measured
//! clockwise from forward on the horizontal plane, so turning right is
//! positive and `RotY(-heading)` reproduces a pure yaw.

use glam::{DMat3, DQuat, DVec3, EulerRot};
use std::f64::consts::FRAC_PI_2;

pub const FORWARD: DVec3 = DVec3::NEG_Z;

/// Phone axis whose heading is aligned by the forward capture: the top edge,
/// which points forward when the phone lies screen-up in front of the user.
pub const DEVICE_FORWARD: DVec3 = DVec3::Y;

/// Horizontal projections shorter than this have no usable heading.
const MIN_HORIZONTAL_LEN: f64 = 1e-6;

/// YXZ pitch this close to +-90 degrees makes yaw and roll inseparable.
const GIMBAL_COS_EPSILON: f64 = 1e-3;

/// Height of the forward-capture anchor above the HMD's horizontal forward.
const CAPTURE_ANCHOR_LIFT: f64 = 0.2;

/// Re-express a phone orientation in the host's convention (-90 degrees about X).
pub fn to_host_frame(raw: DQuat) -> DQuat {
    DQuat::from_axis_angle(DVec3::X, -FRAC_PI_2) * raw
}

/// Clockwise heading of `direction` on the horizontal plane, if it has one.
pub fn heading(direction: DVec3) -> Option<f64> {
    let horizontal = DVec3::new(direction.x, 0.0, direction.z);
    if horizontal.length() < MIN_HORIZONTAL_LEN {
        return None;
    }
    Some(horizontal.x.atan2(-horizontal.z))
}

/// Heading of the HMD's forward axis.
pub fn hmd_heading(hmd_basis: &DMat3) -> Option<f64> {
    heading(*hmd_basis * FORWARD)
}

/// Yaw-only rotation that turns the device's forward heading onto the HMD's.
pub fn forward_alignment(device: DQuat, hmd_basis: &DMat3) -> Option<DQuat> {
    let device_heading = heading(device * DEVICE_FORWARD)?;
    let hmd_heading = hmd_heading(hmd_basis)?;
    Some(DQuat::from_rotation_y(device_heading - hmd_heading))
}

/// Where the tracker is shown while a forward capture runs: one metre ahead
/// of the HMD on the horizontal plane, slightly raised.
pub fn capture_anchor(hmd_basis: &DMat3) -> Option<DVec3> {
    let forward = *hmd_basis * FORWARD;
    let horizontal = DVec3::new(forward.x, 0.0, forward.z).try_normalize()?;
    Some(horizontal + DVec3::new(0.0, CAPTURE_ANCHOR_LIFT, 0.0))
}

/// Static mounting twist of the sensor: the inverse device orientation,
/// rebuilt from its YXZ Euler angles, followed by the HMD heading.
pub fn mount_twist(device: DQuat, hmd_heading: f64) -> Option<DQuat> {
    let (yaw, pitch, roll) = device.inverse().to_euler(EulerRot::YXZ);
    if !pitch.is_finite() || pitch.cos().abs() < GIMBAL_COS_EPSILON {
        return None;
    }
    let inverse = DQuat::from_euler(EulerRot::YXZ, yaw, pitch, roll);
    Some(inverse * DQuat::from_rotation_y(-hmd_heading))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heading_is_clockwise_from_forward() {
        assert!(heading(FORWARD).unwrap().abs() < 1e-12);
        assert!((heading(DVec3::X).unwrap() - FRAC_PI_2).abs() < 1e-12);
        assert!((heading(DVec3::NEG_X).unwrap() + FRAC_PI_2).abs() < 1e-12);
        assert!(heading(DVec3::Y).is_none());
    }

    #[test]
    fn yaw_rotation_has_opposite_heading() {
        let yaw = 0.8;
        let h = heading(DQuat::from_rotation_y(yaw) * FORWARD).unwrap();
        assert!((h + yaw).abs() < 1e-12);
    }

    #[test]
    fn host_frame_turns_phone_top_forward() {
        // A phone lying flat with its top edge along +Y.
        let top = to_host_frame(DQuat::IDENTITY) * DEVICE_FORWARD;
        assert!(top.abs_diff_eq(FORWARD, 1e-12));
    }

    #[test]
    fn forward_alignment_matches_hmd_heading() {
        let device = DQuat::from_rotation_y(1.2) * DQuat::from_rotation_x(0.3);
        let hmd = DMat3::from_quat(DQuat::from_rotation_y(-0.4));

        let alignment = forward_alignment(device, &hmd).unwrap();
        let aligned = heading(alignment * device * DEVICE_FORWARD).unwrap();
        assert!((aligned - hmd_heading(&hmd).unwrap()).abs() < 1e-9);
    }

    #[test]
    fn forward_alignment_refuses_vertical_device() {
        // Top edge pointing at the ceiling.
        assert!(forward_alignment(DQuat::IDENTITY, &DMat3::IDENTITY).is_none());
    }

    #[test]
    fn capture_anchor_is_ahead_and_raised() {
        let hmd = DMat3::from_quat(DQuat::from_rotation_y(FRAC_PI_2));
        let anchor = capture_anchor(&hmd).unwrap();
        assert!(anchor.abs_diff_eq(DVec3::new(-1.0, 0.2, 0.0), 1e-12));
    }

    #[test]
    fn mount_twist_cancels_device_orientation() {
        let device = DQuat::from_rotation_z(0.4) * DQuat::from_rotation_x(0.2);
        let hmd_heading = -0.7;

        let twist = mount_twist(device, hmd_heading).unwrap();
        let result = device * twist;
        assert!(result.abs_diff_eq(DQuat::from_rotation_y(0.7), 1e-9)
            || result.abs_diff_eq(-DQuat::from_rotation_y(0.7), 1e-9));
    }

    #[test]
    fn mount_twist_guards_gimbal_lock() {
        let device = DQuat::from_rotation_x(FRAC_PI_2);
        assert!(mount_twist(device, 0.0).is_none());
    }
}

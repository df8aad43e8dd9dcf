use crate::types::OrientationSample;
use glam::{DQuat, DVec3};
use thiserror::Error;

/// Inbound data packet: 10 x f64 LE = qx qy qz qw ax ay az gx gy gz.
pub const SAMPLE_PACKET_LEN: usize = 10 * 8;

/// Discovery request payload.
pub const DISCOVERY_REQUEST: &[u8] = b"DISCOVERY";

/// Outbound packet kinds.
const KIND_HEARTBEAT: u32 = 1;
const KIND_BUZZ: u32 = 2;

/// Quaternions shorter than this are treated as garbage rather than normalized.
const MIN_QUAT_NORM_SQUARED: f64 = 1e-12;

#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    #[error("Expected an 80-byte sample packet, got {0} bytes")]
    UnexpectedLength(usize),
    #[error("Sample contains a non-finite value")]
    NonFinite,
    #[error("Orientation quaternion has (near) zero length")]
    DegenerateQuaternion,
}

/// Decode one inbound sample packet. The quaternion is normalized on the way out.
pub fn decode_sample(packet: &[u8]) -> Result<OrientationSample, ProtocolError> {
    if packet.len() != SAMPLE_PACKET_LEN {
        return Err(ProtocolError::UnexpectedLength(packet.len()));
    }

    let mut values = [0f64; 10];
    for (value, chunk) in values.iter_mut().zip(packet.chunks_exact(8)) {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(chunk);
        *value = f64::from_le_bytes(bytes);
    }

    if values.iter().any(|v| !v.is_finite()) {
        return Err(ProtocolError::NonFinite);
    }

    let raw = DQuat::from_xyzw(values[0], values[1], values[2], values[3]);
    let norm_squared = raw.length_squared();
    if norm_squared < MIN_QUAT_NORM_SQUARED {
        return Err(ProtocolError::DegenerateQuaternion);
    }

    Ok(OrientationSample {
        rotation: raw / norm_squared.sqrt(),
        accel: DVec3::new(values[4], values[5], values[6]),
        gyro: DVec3::new(values[7], values[8], values[9]),
    })
}

/// Encode a sample in the inbound layout (what the phone sends).
pub fn encode_sample(sample: &OrientationSample) -> [u8; SAMPLE_PACKET_LEN] {
    let mut packet = [0u8; SAMPLE_PACKET_LEN];
    for (chunk, value) in packet.chunks_exact_mut(8).zip(sample.to_array()) {
        chunk.copy_from_slice(&value.to_le_bytes());
    }
    packet
}

/// Keepalive sent to the phone so it can tell the host is up.
pub fn encode_heartbeat(sequence: u64) -> [u8; 12] {
    let mut packet = [0u8; 12];
    packet[..4].copy_from_slice(&KIND_HEARTBEAT.to_le_bytes());
    packet[4..].copy_from_slice(&sequence.to_le_bytes());
    packet
}

/// Haptic command: vibrate for `duration_s` at `frequency` and `amplitude`.
pub fn encode_buzz(duration_s: f64, frequency: f64, amplitude: f64) -> [u8; 28] {
    let mut packet = [0u8; 28];
    packet[..4].copy_from_slice(&KIND_BUZZ.to_le_bytes());
    packet[4..12].copy_from_slice(&duration_s.to_le_bytes());
    packet[12..20].copy_from_slice(&frequency.to_le_bytes());
    packet[20..28].copy_from_slice(&amplitude.to_le_bytes());
    packet
}

/// Whether `payload` is a discovery request. Trailing NULs from C-string senders are ignored.
pub fn is_discovery_request(payload: &[u8]) -> bool {
    let end = payload
        .iter()
        .rposition(|&b| b != 0)
        .map_or(0, |last| last + 1);
    &payload[..end] == DISCOVERY_REQUEST
}

/// Reply to a discovery request: `"<data_port>:<tracker_name>\n"`.
pub fn discovery_response(data_port: u16, tracker_name: &str) -> String {
    format!("{data_port}:{tracker_name}\n")
}

//! UDP data channel for the phone's orientation stream.
//!
//! The phone streams fixed-size sample packets to the bound port. The channel
//! keeps only the newest sample, remembers the last sender as its peer, and
//! sends that peer a heartbeat at a fixed cadence so the app can tell the host
//! is alive. Everything here is non-blocking: one `tick()` is one drain pass.

use crate::protocol::{decode_sample, encode_buzz, encode_heartbeat};
use crate::types::OrientationSample;
use crate::{is_drained, is_stale_icmp, NetError, Result};
use std::io;
use std::net::{IpAddr, SocketAddr, UdpSocket};
use std::time::{Duration, Instant};

/// How many ports above the base are tried before giving up.
pub const PORT_SEARCH_SPAN: u16 = 30;

/// Largest datagram read in one go; anything bigger is not a sample anyway.
const MAX_DATAGRAM_SIZE: usize = 512;

#[derive(Debug, Clone, Copy)]
pub struct ChannelTiming {
    /// Interval between keepalives sent to the peer.
    pub heartbeat_interval: Duration,
    /// How long after the last datagram the peer still counts as connected.
    pub contact_timeout: Duration,
}

impl Default for ChannelTiming {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_millis(500),
            contact_timeout: Duration::from_secs(3),
        }
    }
}

pub struct DataChannel {
    socket: UdpSocket,
    port: u16,
    timing: ChannelTiming,
    listening: bool,
    peer: Option<SocketAddr>,
    last_contact: Option<Instant>,
    last_heartbeat: Option<Instant>,
    heartbeat_seq: u64,
    sample: OrientationSample,
    data_available: bool,
    rejected: u64,
}

impl DataChannel {
    /// Bind `base_port`, or the first free port among the next [`PORT_SEARCH_SPAN`].
    pub fn bind(address: IpAddr, base_port: u16) -> Result<Self> {
        Self::bind_within(address, base_port, PORT_SEARCH_SPAN)
    }

    /// Bind the first free port in `base_port..=base_port + span`.
    pub fn bind_within(address: IpAddr, base_port: u16, span: u16) -> Result<Self> {
        let last = base_port.saturating_add(span);

        for port in base_port..=last {
            match UdpSocket::bind((address, port)) {
                Ok(socket) => {
                    let port = socket.local_addr()?.port();
                    tracing::info!(port, base_port, "Data channel bound");
                    return Ok(Self::from_socket(socket, port));
                }
                Err(e) => {
                    tracing::warn!(port, error = %e, "Port unavailable, trying the next one");
                }
            }
        }

        tracing::error!(first = base_port, last, "No free data port in range");
        Err(NetError::PortExhausted {
            first: base_port,
            last,
        })
    }

    fn from_socket(socket: UdpSocket, port: u16) -> Self {
        Self {
            socket,
            port,
            timing: ChannelTiming::default(),
            listening: false,
            peer: None,
            last_contact: None,
            last_heartbeat: None,
            heartbeat_seq: 0,
            sample: OrientationSample::default(),
            data_available: false,
            rejected: 0,
        }
    }

    pub fn with_timing(mut self, timing: ChannelTiming) -> Self {
        self.timing = timing;
        self
    }

    /// Port actually bound.
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Switch the socket to non-blocking receive and mark the channel active.
    pub fn start_listening(&mut self) -> Result<()> {
        self.socket
            .set_nonblocking(true)
            .map_err(NetError::InitFailed)?;
        self.listening = true;
        tracing::info!(port = self.port, "Data channel listening");
        Ok(())
    }

    pub fn is_listening(&self) -> bool {
        self.listening
    }

    /// One non-blocking drain pass plus a heartbeat if one is due.
    pub fn tick(&mut self) -> Result<()> {
        self.tick_at(Instant::now())
    }

    pub fn tick_at(&mut self, now: Instant) -> Result<()> {
        if !self.listening {
            return Ok(());
        }

        self.drain(now)?;
        self.send_heartbeat_if_due(now)
    }

    fn drain(&mut self, now: Instant) -> Result<()> {
        let mut buf = [0u8; MAX_DATAGRAM_SIZE];

        loop {
            let (len, from) = match self.socket.recv_from(&mut buf) {
                Ok(result) => result,
                Err(e) if is_drained(&e) => return Ok(()),
                Err(e) if is_stale_icmp(&e) => continue,
                Err(e) => return Err(e.into()),
            };

            if self.peer != Some(from) {
                tracing::info!(peer = %from, previous = ?self.peer, "Phone connected");
                self.peer = Some(from);
            }
            self.last_contact = Some(now);

            match decode_sample(&buf[..len]) {
                Ok(sample) => {
                    self.sample = sample;
                    self.data_available = true;
                }
                Err(e) => {
                    self.rejected += 1;
                    if self.rejected % 100 == 1 {
                        tracing::warn!(%e, rejected = self.rejected, "Discarding malformed packet");
                    } else {
                        tracing::trace!(%e, "Discarding malformed packet");
                    }
                }
            }
        }
    }

    fn send_heartbeat_if_due(&mut self, now: Instant) -> Result<()> {
        let Some(peer) = self.peer else {
            return Ok(());
        };
        let due = self
            .last_heartbeat
            .map_or(true, |t| now.duration_since(t) >= self.timing.heartbeat_interval);
        if !due {
            return Ok(());
        }

        self.last_heartbeat = Some(now);
        self.heartbeat_seq = self.heartbeat_seq.wrapping_add(1);
        self.send(&encode_heartbeat(self.heartbeat_seq), peer)
    }

    fn send(&self, packet: &[u8], peer: SocketAddr) -> Result<()> {
        match self.socket.send_to(packet, peer) {
            Ok(_) => Ok(()),
            // A full send buffer drops the datagram, same as the network would.
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Whether a sample was decoded since the last [`reset_data_available`](Self::reset_data_available).
    pub fn is_data_available(&self) -> bool {
        self.data_available
    }

    /// Clear the availability flag so fresh data has to be seen again.
    pub fn reset_data_available(&mut self) {
        self.data_available = false;
    }

    /// Whether any datagram arrived from the peer within the contact timeout.
    pub fn is_connection_alive(&self) -> bool {
        self.is_connection_alive_at(Instant::now())
    }

    pub fn is_connection_alive_at(&self, now: Instant) -> bool {
        self.last_contact
            .is_some_and(|t| now.saturating_duration_since(t) < self.timing.contact_timeout)
    }

    /// Newest decoded sample.
    pub fn sample(&self) -> &OrientationSample {
        &self.sample
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Ask the phone to vibrate. No acknowledgement is tracked.
    pub fn buzz(&self, duration_s: f64, frequency: f64, amplitude: f64) -> Result<()> {
        let Some(peer) = self.peer else {
            tracing::debug!("Buzz requested with no phone connected");
            return Ok(());
        };
        self.send(&encode_buzz(duration_s, frequency, amplitude), peer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::encode_sample;
    use glam::{DQuat, DVec3};
    use std::net::Ipv4Addr;

    const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

    /// Hold `count` consecutive loopback ports.
    fn occupy_consecutive(count: u16) -> (u16, Vec<UdpSocket>) {
        let mut base = 41000;
        loop {
            let held: Vec<_> = (base..base + count)
                .map_while(|port| UdpSocket::bind((LOCALHOST, port)).ok())
                .collect();
            if held.len() == count as usize {
                return (base, held);
            }
            base += count + 1;
            assert!(base < 60000, "no free port block found");
        }
    }

    fn listening_channel() -> (DataChannel, UdpSocket) {
        let mut channel = DataChannel::bind(LOCALHOST, 0).unwrap();
        channel.start_listening().unwrap();
        let phone = UdpSocket::bind((LOCALHOST, 0)).unwrap();
        phone
            .set_read_timeout(Some(Duration::from_millis(500)))
            .unwrap();
        (channel, phone)
    }

    fn tick_until_data(channel: &mut DataChannel) {
        for _ in 0..100 {
            channel.tick().unwrap();
            if channel.is_data_available() {
                return;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        panic!("no sample arrived");
    }

    /// Hold one loopback port whose upper neighbour is free.
    fn occupy_before_free_port() -> (u16, UdpSocket) {
        for base in (41000..60000).step_by(2) {
            let Ok(held) = UdpSocket::bind((LOCALHOST, base)) else {
                continue;
            };
            if UdpSocket::bind((LOCALHOST, base + 1)).is_ok() {
                return (base, held);
            }
        }
        panic!("no free port pair found");
    }

    #[test]
    fn falls_back_to_next_free_port() {
        let (base, _held) = occupy_before_free_port();
        let channel = DataChannel::bind(LOCALHOST, base).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(channel.port(), base + 1);
    }

    #[test]
    fn exhausted_range_is_reported() {
        let (base, _held) = occupy_consecutive(3);
        match DataChannel::bind_within(LOCALHOST, base, 2) {
            Err(NetError::PortExhausted { first, last }) => {
                assert_eq!(first, base);
                assert_eq!(last, base + 2);
            }
            Err(e) => panic!("unexpected error: {e}"),
            Ok(c) => panic!("bound port {}", c.port()),
        }
    }

    #[test]
    fn tick_before_listening_reads_nothing() {
        let mut channel = DataChannel::bind(LOCALHOST, 0).unwrap();
        channel.tick().unwrap();
        assert!(!channel.is_data_available());
        assert!(!channel.is_connection_alive());
    }

    #[test]
    fn keeps_latest_sample_and_tracks_peer() {
        let (mut channel, phone) = listening_channel();
        let addr = channel.local_addr().unwrap();

        let first = OrientationSample::default();
        let second = OrientationSample {
            rotation: DQuat::from_rotation_y(1.0),
            accel: DVec3::X,
            gyro: DVec3::Y,
        };
        phone.send_to(&encode_sample(&first), addr).unwrap();
        phone.send_to(&encode_sample(&second), addr).unwrap();

        // Both may or may not land in the same drain pass.
        for _ in 0..100 {
            channel.tick().unwrap();
            if channel.sample().rotation.abs_diff_eq(second.rotation, 1e-9) {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }

        assert!(channel.is_data_available());
        assert!(channel.sample().rotation.abs_diff_eq(second.rotation, 1e-9));
        assert_eq!(channel.peer(), Some(phone.local_addr().unwrap()));
        assert!(channel.is_connection_alive());

        channel.reset_data_available();
        assert!(!channel.is_data_available());
    }

    #[test]
    fn malformed_packet_counts_as_contact_only() {
        let (mut channel, phone) = listening_channel();
        phone.send_to(&[1, 2, 3], channel.local_addr().unwrap()).unwrap();

        for _ in 0..100 {
            channel.tick().unwrap();
            if channel.is_connection_alive() {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }

        assert!(channel.is_connection_alive());
        assert!(!channel.is_data_available());
        assert_eq!(*channel.sample(), OrientationSample::default());
    }

    #[test]
    fn connection_expires_after_timeout() {
        let (channel, phone) = listening_channel();
        let mut channel = channel.with_timing(ChannelTiming {
            heartbeat_interval: Duration::from_secs(60),
            contact_timeout: Duration::from_millis(100),
        });
        phone
            .send_to(&encode_sample(&OrientationSample::default()), channel.local_addr().unwrap())
            .unwrap();
        tick_until_data(&mut channel);

        let later = Instant::now() + Duration::from_millis(150);
        assert!(!channel.is_connection_alive_at(later));
    }

    #[test]
    fn sends_heartbeat_and_buzz_to_peer() {
        let (mut channel, phone) = listening_channel();
        phone
            .send_to(&encode_sample(&OrientationSample::default()), channel.local_addr().unwrap())
            .unwrap();
        tick_until_data(&mut channel);

        let mut buf = [0u8; 64];
        let (len, _) = phone.recv_from(&mut buf).unwrap();
        assert_eq!(len, 12);
        assert_eq!(u32::from_le_bytes(buf[..4].try_into().unwrap()), 1);

        channel.buzz(0.7, 100.0, 0.5).unwrap();
        let (len, _) = phone.recv_from(&mut buf).unwrap();
        assert_eq!(len, 28);
        assert_eq!(u32::from_le_bytes(buf[..4].try_into().unwrap()), 2);
    }

    #[test]
    fn heartbeat_respects_cadence() {
        let (mut channel, phone) = listening_channel();
        phone
            .send_to(&encode_sample(&OrientationSample::default()), channel.local_addr().unwrap())
            .unwrap();
        tick_until_data(&mut channel);
        let first_seq = channel.heartbeat_seq;
        assert_eq!(first_seq, 1);

        channel.tick().unwrap();
        assert_eq!(channel.heartbeat_seq, first_seq);

        let later = Instant::now() + Duration::from_secs(1);
        channel.tick_at(later).unwrap();
        assert_eq!(channel.heartbeat_seq, first_seq + 1);
    }
}

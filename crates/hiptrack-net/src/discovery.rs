use crate::protocol::{discovery_response, is_discovery_request};
use crate::{is_drained, is_stale_icmp, NetError, Result};
use std::net::{IpAddr, SocketAddr, UdpSocket};

/// Datagrams longer than this are not discovery requests anyway.
const MAX_REQUEST_LEN: usize = 64;

/// Answers `DISCOVERY` broadcasts with the data port and tracker name so the
/// phone app can find the host without manual IP entry.
pub struct DiscoveryResponder {
    socket: UdpSocket,
    response: String,
}

impl DiscoveryResponder {
    /// Bind the discovery port. Port 0 binds an ephemeral port.
    pub fn bind(address: IpAddr, port: u16, data_port: u16, tracker_name: &str) -> Result<Self> {
        let socket = UdpSocket::bind((address, port))
            .map_err(|source| NetError::BindFailed { port, source })?;
        socket.set_nonblocking(true).map_err(NetError::InitFailed)?;

        let responder = Self {
            socket,
            response: discovery_response(data_port, tracker_name),
        };
        tracing::info!(
            port = responder.port(),
            response = responder.response.trim_end(),
            "Discovery responder bound"
        );
        Ok(responder)
    }

    /// Port actually bound.
    pub fn port(&self) -> u16 {
        self.socket.local_addr().map(|a| a.port()).unwrap_or(0)
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Change the announced data port and tracker name.
    pub fn set_tracker(&mut self, data_port: u16, tracker_name: &str) {
        self.response = discovery_response(data_port, tracker_name);
    }

    /// Answer every pending request without blocking. Returns how many were answered.
    pub fn tick(&mut self) -> Result<usize> {
        let mut buf = [0u8; MAX_REQUEST_LEN];
        let mut answered = 0;

        loop {
            let (len, from) = match self.socket.recv_from(&mut buf) {
                Ok(result) => result,
                Err(e) if is_drained(&e) => return Ok(answered),
                Err(e) if is_stale_icmp(&e) => continue,
                Err(e) => return Err(e.into()),
            };

            if !is_discovery_request(&buf[..len]) {
                tracing::trace!(%from, len, "Ignoring non-discovery datagram");
                continue;
            }

            self.socket.send_to(self.response.as_bytes(), from)?;
            answered += 1;
            tracing::debug!(%from, "Answered discovery request");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use std::time::Duration;

    const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

    fn client() -> UdpSocket {
        let socket = UdpSocket::bind((LOCALHOST, 0)).unwrap();
        socket.set_read_timeout(Some(Duration::from_millis(500))).unwrap();
        socket
    }

    /// Datagrams on loopback are not instantly visible to a non-blocking reader.
    fn tick_until_answered(responder: &mut DiscoveryResponder) -> usize {
        for _ in 0..100 {
            let answered = responder.tick().unwrap();
            if answered > 0 {
                return answered;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        0
    }

    #[test]
    fn tick_without_pending_request_is_noop() {
        let mut responder = DiscoveryResponder::bind(LOCALHOST, 0, 6969, "Default").unwrap();
        assert_eq!(responder.tick().unwrap(), 0);
        assert_eq!(responder.tick().unwrap(), 0);
    }

    #[test]
    fn answers_discovery_request() {
        let mut responder = DiscoveryResponder::bind(LOCALHOST, 0, 6970, "Default").unwrap();
        let phone = client();
        phone
            .send_to(b"DISCOVERY", responder.local_addr().unwrap())
            .unwrap();

        assert_eq!(tick_until_answered(&mut responder), 1);

        let mut buf = [0u8; 64];
        let (len, _) = phone.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..len], b"6970:Default\n");
    }

    #[test]
    fn ignores_other_payloads() {
        let mut responder = DiscoveryResponder::bind(LOCALHOST, 0, 6969, "Hip").unwrap();
        let phone = client();
        let addr = responder.local_addr().unwrap();
        phone.send_to(b"HELLO", addr).unwrap();
        phone.send_to(b"DISCOVERY", addr).unwrap();

        // Only the second datagram earns a reply.
        assert_eq!(tick_until_answered(&mut responder), 1);
        let mut buf = [0u8; 64];
        let (len, _) = phone.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..len], b"6969:Hip\n");
    }
}

pub mod channel;
pub mod discovery;
pub mod protocol;
pub mod types;

pub use channel::{ChannelTiming, DataChannel, PORT_SEARCH_SPAN};
pub use discovery::DiscoveryResponder;
pub use protocol::ProtocolError;
pub use types::OrientationSample;

use std::io;
use std::net::{IpAddr, Ipv4Addr, UdpSocket};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NetError {
    #[error("Ports {first}-{last} are all taken")]
    PortExhausted { first: u16, last: u16 },
    #[error("Failed to bind UDP port {port}: {source}")]
    BindFailed { port: u16, source: io::Error },
    #[error("Failed to start listening: {0}")]
    InitFailed(io::Error),
    #[error("UDP transport error: {0}")]
    Transport(#[from] io::Error),
}

impl NetError {
    /// Startup failures end the session; transport failures are retried next tick.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, NetError::Transport(_))
    }
}

pub type Result<T> = std::result::Result<T, NetError>;

/// Best guess at the LAN address the phone should reach us on.
///
/// Connecting a UDP socket only selects a route; nothing is sent.
pub fn primary_local_ip() -> io::Result<IpAddr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
    socket.connect((Ipv4Addr::new(192, 0, 2, 1), 9))?;
    Ok(socket.local_addr()?.ip())
}

/// Receive errors that only mean "nothing more to read right now".
pub(crate) fn is_drained(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
}

/// Windows reports ICMP port-unreachable from an earlier send as a receive error.
pub(crate) fn is_stale_icmp(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::ConnectionReset
}

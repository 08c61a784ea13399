//! Instrumentation points
//!
//! A probe point is a fixed location along the packet path where a
//! timestamp may be taken. [`ProbeId`] is the raw identifier stored in each
//! record; [`ProbePoint`] names the well-known points of the send and
//! receive paths.

use derive_more::Display;
use serde::{Deserialize, Serialize};

/// Raw identifier of an instrumentation point
#[derive(
    Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ProbeId(pub u16);

impl ProbeId {
    /// The well-known point for this identifier, if any
    pub fn point(self) -> Option<ProbePoint> {
        ProbePoint::from_id(self.0)
    }
}

impl From<u16> for ProbeId {
    fn from(id: u16) -> Self {
        Self(id)
    }
}

impl From<ProbePoint> for ProbeId {
    fn from(point: ProbePoint) -> Self {
        Self(point as u16)
    }
}

/// Direction of traffic through a probe point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Send,
    Receive,
}

/// Well-known probe points of the network stack
///
/// Send-side points count down the stack from the socket to the device,
/// receive-side points count up. UDP variants sit ten above their TCP twins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum ProbePoint {
    /// Data handed to the socket layer
    SendSocket = 1,
    /// Socket layer hands data to the transport layer
    SendSocketToTransport = 2,
    /// TCP hands a segment to IP
    SendTcpToIp = 3,
    /// IP hands a packet to the device layer
    SendIpToDevice = 4,
    /// Packet leaves through the device
    SendDevice = 5,
    /// Packet arrives at the device
    RecvDevice = 6,
    /// Device layer hands a packet to IP
    RecvDeviceToIp = 7,
    /// IP hands a segment to TCP
    RecvIpToTcp = 8,
    /// TCP hands data to the socket layer
    RecvTcpToSocket = 9,
    /// Data read from the socket
    RecvSocket = 10,
    /// UDP hands a datagram to IP
    SendUdpToIp = 13,
    /// IP hands a datagram to UDP
    RecvIpToUdp = 18,
    /// UDP hands data to the socket layer
    RecvUdpToSocket = 19,
}

impl ProbePoint {
    /// All well-known points, in identifier order
    pub const ALL: [ProbePoint; 13] = [
        Self::SendSocket,
        Self::SendSocketToTransport,
        Self::SendTcpToIp,
        Self::SendIpToDevice,
        Self::SendDevice,
        Self::RecvDevice,
        Self::RecvDeviceToIp,
        Self::RecvIpToTcp,
        Self::RecvTcpToSocket,
        Self::RecvSocket,
        Self::SendUdpToIp,
        Self::RecvIpToUdp,
        Self::RecvUdpToSocket,
    ];

    /// Numeric identifier stored in event records
    pub fn id(self) -> ProbeId {
        ProbeId::from(self)
    }

    /// Look up a point by identifier
    pub fn from_id(id: u16) -> Option<Self> {
        Self::ALL.iter().copied().find(|p| *p as u16 == id)
    }

    /// Traffic direction this point observes
    pub fn direction(self) -> Direction {
        match self {
            Self::SendSocket
            | Self::SendSocketToTransport
            | Self::SendTcpToIp
            | Self::SendUdpToIp
            | Self::SendIpToDevice
            | Self::SendDevice => Direction::Send,
            _ => Direction::Receive,
        }
    }

    /// Short label for logs and reports
    pub fn label(self) -> &'static str {
        match self {
            Self::SendSocket => "send.sock",
            Self::SendSocketToTransport => "send.sock>trans",
            Self::SendTcpToIp => "send.tcp>ip",
            Self::SendUdpToIp => "send.udp>ip",
            Self::SendIpToDevice => "send.ip>net",
            Self::SendDevice => "send.net",
            Self::RecvDevice => "recv.net",
            Self::RecvDeviceToIp => "recv.net>ip",
            Self::RecvIpToTcp => "recv.ip>tcp",
            Self::RecvIpToUdp => "recv.ip>udp",
            Self::RecvTcpToSocket => "recv.tcp>sock",
            Self::RecvUdpToSocket => "recv.udp>sock",
            Self::RecvSocket => "recv.sock",
        }
    }
}

impl std::fmt::Display for ProbePoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

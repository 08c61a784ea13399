//! Transport segment inspection
//!
//! Before a segment is scanned, the probe locates its application payload
//! and filters out segments that carry no data (connection setup and
//! teardown, bare acknowledgements).

use serde::{Deserialize, Serialize};

use flowprobe_core::ScanError;

/// Length of a UDP header
pub const UDP_HEADER_LEN: usize = 8;

/// Length of a TCP header without options
pub const TCP_MIN_HEADER_LEN: usize = 20;

const TCP_FIN: u8 = 0x01;
const TCP_SYN: u8 = 0x02;
const TCP_RST: u8 = 0x04;
const TCP_ACK: u8 = 0x10;

/// Transport protocol of a segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransportProtocol {
    Tcp,
    Udp,
}

impl TransportProtocol {
    /// Map an IP protocol number; `None` for anything but TCP (6) and UDP (17)
    pub fn from_ip_protocol(protocol: u8) -> Option<Self> {
        match protocol {
            6 => Some(Self::Tcp),
            17 => Some(Self::Udp),
            _ => None,
        }
    }

    /// IP protocol number
    pub fn ip_protocol(self) -> u8 {
        match self {
            Self::Tcp => 6,
            Self::Udp => 17,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Tcp => "TCP",
            Self::Udp => "UDP",
        }
    }
}

/// Segments that carry no application data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ControlKind {
    Syn,
    Fin,
    Rst,
    /// ACK with no payload
    AckOnly,
}

/// Classification of a transport segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SegmentKind {
    /// Payload starts at `offset`
    Data { offset: usize },
    /// Nothing to scan
    Control(ControlKind),
}

/// Find the payload of a segment that starts at its transport header
///
/// TCP flags are checked in the order SYN, FIN, RST, so a SYN|ACK is a
/// `Syn`. A TCP segment with ACK set and no bytes past the header is
/// `AckOnly`.
///
/// # Errors
///
/// [`ScanError::TruncatedHeader`] when the segment is shorter than its
/// header, or the TCP data offset is below the minimum header size.
pub fn locate_payload(
    protocol: TransportProtocol,
    segment: &[u8],
) -> Result<SegmentKind, ScanError> {
    let truncated = || ScanError::TruncatedHeader {
        protocol: protocol.name(),
        len: segment.len(),
    };

    match protocol {
        TransportProtocol::Udp => {
            if segment.len() < UDP_HEADER_LEN {
                return Err(truncated());
            }
            Ok(SegmentKind::Data {
                offset: UDP_HEADER_LEN,
            })
        }
        TransportProtocol::Tcp => {
            if segment.len() < TCP_MIN_HEADER_LEN {
                return Err(truncated());
            }
            let offset = usize::from(segment[12] >> 4) * 4;
            let flags = segment[13];

            if flags & TCP_SYN != 0 {
                return Ok(SegmentKind::Control(ControlKind::Syn));
            }
            if flags & TCP_FIN != 0 {
                return Ok(SegmentKind::Control(ControlKind::Fin));
            }
            if flags & TCP_RST != 0 {
                return Ok(SegmentKind::Control(ControlKind::Rst));
            }
            if offset < TCP_MIN_HEADER_LEN || offset > segment.len() {
                return Err(truncated());
            }
            if flags & TCP_ACK != 0 && offset == segment.len() {
                return Ok(SegmentKind::Control(ControlKind::AckOnly));
            }
            Ok(SegmentKind::Data { offset })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// TCP header with the given data offset (in words) and flags, followed
    /// by `payload` bytes
    fn tcp_segment(offset_words: u8, flags: u8, payload: usize) -> Vec<u8> {
        let header_len = usize::from(offset_words) * 4;
        let mut segment = vec![0u8; header_len.max(TCP_MIN_HEADER_LEN) + payload];
        segment[12] = offset_words << 4;
        segment[13] = flags;
        segment
    }

    #[test]
    fn test_protocol_numbers() {
        assert_eq!(TransportProtocol::from_ip_protocol(6), Some(TransportProtocol::Tcp));
        assert_eq!(TransportProtocol::from_ip_protocol(17), Some(TransportProtocol::Udp));
        assert_eq!(TransportProtocol::from_ip_protocol(1), None);
        assert_eq!(TransportProtocol::Udp.ip_protocol(), 17);
    }

    #[test]
    fn test_udp_payload_after_header() {
        let segment = vec![0u8; 40];
        assert_eq!(
            locate_payload(TransportProtocol::Udp, &segment),
            Ok(SegmentKind::Data { offset: 8 })
        );
        assert!(locate_payload(TransportProtocol::Udp, &segment[..7]).is_err());
    }

    #[test]
    fn test_tcp_data_offset_includes_options() {
        let segment = tcp_segment(8, TCP_ACK, 64);
        assert_eq!(
            locate_payload(TransportProtocol::Tcp, &segment),
            Ok(SegmentKind::Data { offset: 32 })
        );
    }

    #[test]
    fn test_tcp_control_segments() {
        let cases = [
            (TCP_SYN, ControlKind::Syn),
            (TCP_SYN | TCP_ACK, ControlKind::Syn),
            (TCP_FIN | TCP_ACK, ControlKind::Fin),
            (TCP_RST, ControlKind::Rst),
        ];
        for (flags, kind) in cases {
            let segment = tcp_segment(5, flags, 16);
            assert_eq!(
                locate_payload(TransportProtocol::Tcp, &segment),
                Ok(SegmentKind::Control(kind))
            );
        }
    }

    #[test]
    fn test_tcp_bare_ack() {
        let segment = tcp_segment(5, TCP_ACK, 0);
        assert_eq!(
            locate_payload(TransportProtocol::Tcp, &segment),
            Ok(SegmentKind::Control(ControlKind::AckOnly))
        );

        // Push without ACK and no payload still yields an (empty) data segment
        let segment = tcp_segment(5, 0x08, 0);
        assert_eq!(
            locate_payload(TransportProtocol::Tcp, &segment),
            Ok(SegmentKind::Data { offset: 20 })
        );
    }

    #[test]
    fn test_tcp_truncated() {
        let err = locate_payload(TransportProtocol::Tcp, &[0u8; 12]).unwrap_err();
        assert_eq!(
            err,
            ScanError::TruncatedHeader {
                protocol: "TCP",
                len: 12
            }
        );

        // Data offset points past the end of the segment
        let mut segment = tcp_segment(5, TCP_ACK, 0);
        segment[12] = 15 << 4;
        assert!(locate_payload(TransportProtocol::Tcp, &segment).is_err());

        // Data offset below the minimum header
        let mut segment = tcp_segment(5, TCP_ACK, 8);
        segment[12] = 2 << 4;
        assert!(locate_payload(TransportProtocol::Tcp, &segment).is_err());
    }
}

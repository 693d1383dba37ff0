//! Layered packet decoding.
//!
//! [`ParsedPacket::parse`] is the strict entry point: it requires both a
//! network layer and the transport layer that the network layer declares.
//! [`ParsedPacket::parse_network`] accepts any packet with a decodable network
//! layer and leaves the transport as [`TransportHeader::Unknown`], which is
//! what the session falls back to when the transport is truncated or
//! unsupported so the callback can still see addresses.

use crate::error::ParseError;
use crate::protocol::icmp::IcmpHeader;
use crate::protocol::ip_proto;
use crate::protocol::ipv4::Ipv4Header;
use crate::protocol::ipv6::Ipv6Header;
use crate::protocol::tcp::TcpHeader;
use crate::protocol::udp::UdpHeader;
use std::net::IpAddr;

/// Decoded network layer.
#[derive(Debug, Clone)]
pub enum NetworkHeader<'a> {
    V4(Ipv4Header<'a>),
    V6(Ipv6Header<'a>),
    Unknown,
}

impl<'a> NetworkHeader<'a> {
    pub fn src_addr(&self) -> Option<IpAddr> {
        match self {
            NetworkHeader::V4(ip) => Some(IpAddr::V4(ip.src_addr())),
            NetworkHeader::V6(ip) => Some(IpAddr::V6(ip.src_addr())),
            NetworkHeader::Unknown => None,
        }
    }

    pub fn dst_addr(&self) -> Option<IpAddr> {
        match self {
            NetworkHeader::V4(ip) => Some(IpAddr::V4(ip.dst_addr())),
            NetworkHeader::V6(ip) => Some(IpAddr::V6(ip.dst_addr())),
            NetworkHeader::Unknown => None,
        }
    }

    /// Declared next-protocol number.
    pub fn protocol(&self) -> Option<u8> {
        match self {
            NetworkHeader::V4(ip) => Some(ip.protocol()),
            NetworkHeader::V6(ip) => Some(ip.next_header()),
            NetworkHeader::Unknown => None,
        }
    }

    pub fn header_len(&self) -> Option<usize> {
        match self {
            NetworkHeader::V4(ip) => Some(ip.header_len()),
            NetworkHeader::V6(ip) => Some(ip.header_len()),
            NetworkHeader::Unknown => None,
        }
    }
}

/// Decoded transport layer.
///
/// Only populated with a real variant when the network layer decoded and
/// declared a matching protocol; everything else is `Unknown`.
#[derive(Debug, Clone)]
pub enum TransportHeader<'a> {
    Tcp(TcpHeader<'a>),
    Udp(UdpHeader<'a>),
    Icmp(IcmpHeader<'a>),
    Unknown { protocol: u8 },
}

impl<'a> TransportHeader<'a> {
    pub fn src_port(&self) -> Option<u16> {
        match self {
            TransportHeader::Tcp(tcp) => Some(tcp.src_port()),
            TransportHeader::Udp(udp) => Some(udp.src_port()),
            _ => None,
        }
    }

    pub fn dst_port(&self) -> Option<u16> {
        match self {
            TransportHeader::Tcp(tcp) => Some(tcp.dst_port()),
            TransportHeader::Udp(udp) => Some(udp.dst_port()),
            _ => None,
        }
    }

    fn header_len(&self) -> usize {
        match self {
            TransportHeader::Tcp(tcp) => tcp.header_len(),
            TransportHeader::Udp(_) => crate::protocol::udp::HEADER_SIZE,
            TransportHeader::Icmp(_) => crate::protocol::icmp::HEADER_SIZE,
            TransportHeader::Unknown { .. } => 0,
        }
    }
}

/// A fully decoded view of one captured packet.
///
/// Borrows the raw bytes of the originating event; never outlives the verdict
/// call for that packet.
#[derive(Debug, Clone)]
pub struct ParsedPacket<'a> {
    pub network: NetworkHeader<'a>,
    pub transport: TransportHeader<'a>,
    /// Offset of the transport payload within `raw` (end of the decoded
    /// headers).
    pub payload_offset: usize,
    raw: &'a [u8],
}

impl<'a> ParsedPacket<'a> {
    /// Strict parse: network layer plus the transport layer it declares.
    pub fn parse(raw: &'a [u8]) -> Result<Self, ParseError> {
        let network = parse_network_header(raw)?;
        // Unwraps are safe: parse_network_header never returns Unknown.
        let net_len = network.header_len().unwrap_or(0);
        let protocol = network.protocol().unwrap_or(0);
        let segment = &raw[net_len..];

        let transport = parse_transport_header(&network, protocol, segment)?;
        let payload_offset = net_len + transport.header_len();

        Ok(Self {
            network,
            transport,
            payload_offset,
            raw,
        })
    }

    /// Lenient parse: network layer only, transport left `Unknown`.
    pub fn parse_network(raw: &'a [u8]) -> Result<Self, ParseError> {
        let network = parse_network_header(raw)?;
        let net_len = network.header_len().unwrap_or(0);
        let protocol = network.protocol().unwrap_or(0);

        Ok(Self {
            network,
            transport: TransportHeader::Unknown { protocol },
            payload_offset: net_len,
            raw,
        })
    }

    /// The original capture bytes backing this parse.
    pub fn raw(&self) -> &'a [u8] {
        self.raw
    }

    /// Transport payload (bytes past all decoded headers).
    pub fn payload(&self) -> &'a [u8] {
        &self.raw[self.payload_offset..]
    }

    pub fn src_addr(&self) -> Option<IpAddr> {
        self.network.src_addr()
    }

    pub fn dst_addr(&self) -> Option<IpAddr> {
        self.network.dst_addr()
    }

    pub fn src_port(&self) -> Option<u16> {
        self.transport.src_port()
    }

    pub fn dst_port(&self) -> Option<u16> {
        self.transport.dst_port()
    }
}

fn parse_network_header(raw: &[u8]) -> Result<NetworkHeader<'_>, ParseError> {
    let first = *raw
        .first()
        .ok_or(ParseError::NoNetworkLayer("empty packet"))?;

    match first >> 4 {
        4 => Ok(NetworkHeader::V4(Ipv4Header::parse(raw)?)),
        6 => Ok(NetworkHeader::V6(Ipv6Header::parse(raw)?)),
        _ => Err(ParseError::NoNetworkLayer("unrecognized IP version")),
    }
}

fn parse_transport_header<'a>(
    network: &NetworkHeader<'a>,
    protocol: u8,
    segment: &'a [u8],
) -> Result<TransportHeader<'a>, ParseError> {
    // A fragment's segment is mid-datagram payload, not a transport header;
    // only the reassembled datagram carries one.
    if let NetworkHeader::V4(ip) = network {
        if ip.is_fragment() {
            return Err(ParseError::NoTransportLayer {
                protocol,
                reason: "fragmented datagram",
            });
        }
    }

    match protocol {
        ip_proto::TCP => Ok(TransportHeader::Tcp(TcpHeader::parse(segment)?)),
        ip_proto::UDP => Ok(TransportHeader::Udp(UdpHeader::parse(segment)?)),
        // ICMP is an IPv4 protocol; over IPv6 the equivalent is ICMPv6, which
        // this decoder does not interpret.
        ip_proto::ICMP if matches!(network, NetworkHeader::V4(_)) => {
            Ok(TransportHeader::Icmp(IcmpHeader::parse(segment)?))
        }
        other => Err(ParseError::NoTransportLayer {
            protocol: other,
            reason: "unsupported protocol",
        }),
    }
}

//! Re-serialization of (possibly mutated) packets.
//!
//! The fix-up pass rewrites length fields from the actual buffer size rather
//! than trusting values carried over from the capture, then recomputes the
//! IPv4 header checksum and the transport checksum over the pseudo-header.
//! Recompiling an already-correct, unmutated capture reproduces it
//! byte-identically.

use crate::error::SerializeError;
use crate::packet::{NetworkHeader, ParsedPacket, TransportHeader};
use crate::protocol::tcp::{transport_checksum_v4, transport_checksum_v6};
use crate::protocol::{internet_checksum, ip_proto};
use std::net::{Ipv4Addr, Ipv6Addr};

/// Re-serialize a parsed packet without mutation.
///
/// Fails with [`SerializeError::NoNetworkLayer`] when the parse carries no
/// decoded network layer: without addresses there is no pseudo-header, and an
/// unchecksummed packet must never be forwarded.
pub fn recompile(parsed: &ParsedPacket<'_>) -> Result<Vec<u8>, SerializeError> {
    let mut buffer = parsed.raw().to_vec();
    match &parsed.network {
        NetworkHeader::V4(ip) => fixup_v4(&mut buffer, ip.header_len())?,
        NetworkHeader::V6(_) => fixup_v6(&mut buffer)?,
        NetworkHeader::Unknown => return Err(SerializeError::NoNetworkLayer),
    }
    Ok(buffer)
}

/// An owned IPv4 packet buffer accepting field mutations, recompiled into
/// consistent wire bytes at the end.
///
/// Scoped to one packet-handling call; the result feeds a
/// [`Verdict::Modify`](crate::queue::Verdict::Modify).
#[derive(Debug, Clone)]
pub struct MutablePacket {
    buffer: Vec<u8>,
    header_len: usize,
    payload_offset: usize,
    has_ports: bool,
}

impl MutablePacket {
    /// Take an owned copy of a parsed IPv4 packet for mutation.
    pub fn from_parsed(parsed: &ParsedPacket<'_>) -> Result<Self, SerializeError> {
        let header_len = match &parsed.network {
            NetworkHeader::V4(ip) => ip.header_len(),
            NetworkHeader::V6(_) => return Err(SerializeError::Ipv4Only),
            NetworkHeader::Unknown => return Err(SerializeError::NoNetworkLayer),
        };
        let has_ports = matches!(
            parsed.transport,
            TransportHeader::Tcp(_) | TransportHeader::Udp(_)
        );

        Ok(Self {
            buffer: parsed.raw().to_vec(),
            header_len,
            payload_offset: parsed.payload_offset,
            has_ports,
        })
    }

    pub fn src_addr(&self) -> Ipv4Addr {
        Ipv4Addr::new(
            self.buffer[12],
            self.buffer[13],
            self.buffer[14],
            self.buffer[15],
        )
    }

    pub fn dst_addr(&self) -> Ipv4Addr {
        Ipv4Addr::new(
            self.buffer[16],
            self.buffer[17],
            self.buffer[18],
            self.buffer[19],
        )
    }

    pub fn set_src_addr(&mut self, addr: Ipv4Addr) {
        self.buffer[12..16].copy_from_slice(&addr.octets());
    }

    pub fn set_dst_addr(&mut self, addr: Ipv4Addr) {
        self.buffer[16..20].copy_from_slice(&addr.octets());
    }

    pub fn ttl(&self) -> u8 {
        self.buffer[8]
    }

    pub fn set_ttl(&mut self, ttl: u8) {
        self.buffer[8] = ttl;
    }

    pub fn set_src_port(&mut self, port: u16) -> Result<(), SerializeError> {
        if !self.has_ports {
            return Err(SerializeError::NoTransportPorts);
        }
        let off = self.header_len;
        self.buffer[off..off + 2].copy_from_slice(&port.to_be_bytes());
        Ok(())
    }

    pub fn set_dst_port(&mut self, port: u16) -> Result<(), SerializeError> {
        if !self.has_ports {
            return Err(SerializeError::NoTransportPorts);
        }
        let off = self.header_len + 2;
        self.buffer[off..off + 2].copy_from_slice(&port.to_be_bytes());
        Ok(())
    }

    /// Replace the transport payload. Length fields are corrected at
    /// recompile time.
    pub fn replace_payload(&mut self, data: &[u8]) {
        self.buffer.truncate(self.payload_offset);
        self.buffer.extend_from_slice(data);
    }

    /// Produce length-consistent, checksummed wire bytes.
    pub fn recompile(mut self) -> Result<Vec<u8>, SerializeError> {
        fixup_v4(&mut self.buffer, self.header_len)?;
        Ok(self.buffer)
    }
}

fn fixup_v4(buffer: &mut [u8], header_len: usize) -> Result<(), SerializeError> {
    let total_len = buffer.len();
    if total_len > u16::MAX as usize {
        return Err(SerializeError::Oversize(total_len));
    }

    buffer[2..4].copy_from_slice(&(total_len as u16).to_be_bytes());

    buffer[10] = 0;
    buffer[11] = 0;
    let sum = internet_checksum(&buffer[..header_len]);
    buffer[10..12].copy_from_slice(&sum.to_be_bytes());

    let src = Ipv4Addr::new(buffer[12], buffer[13], buffer[14], buffer[15]);
    let dst = Ipv4Addr::new(buffer[16], buffer[17], buffer[18], buffer[19]);
    let protocol = buffer[9];

    // MF set or offset non-zero: the bytes past the IP header belong to a
    // larger datagram and must pass through untouched.
    let fragmented = (buffer[6] & 0x20) != 0 || (buffer[6] & 0x1F) != 0 || buffer[7] != 0;
    if fragmented {
        return Ok(());
    }

    let segment = &mut buffer[header_len..];
    match protocol {
        ip_proto::TCP if segment.len() >= 20 => {
            segment[16] = 0;
            segment[17] = 0;
            let sum = transport_checksum_v4(src, dst, protocol, segment);
            segment[16..18].copy_from_slice(&sum.to_be_bytes());
        }
        ip_proto::UDP if segment.len() >= 8 => {
            let udp_len = segment.len();
            if udp_len > u16::MAX as usize {
                return Err(SerializeError::Oversize(udp_len));
            }
            segment[4..6].copy_from_slice(&(udp_len as u16).to_be_bytes());
            // Checksum zero means the sender disabled it; that stays legal
            // after mutation, so preserve it.
            if segment[6] != 0 || segment[7] != 0 {
                segment[6] = 0;
                segment[7] = 0;
                let sum = transport_checksum_v4(src, dst, protocol, segment);
                segment[6..8].copy_from_slice(&sum.to_be_bytes());
            }
        }
        ip_proto::ICMP if segment.len() >= 8 => {
            segment[2] = 0;
            segment[3] = 0;
            let sum = internet_checksum(segment);
            segment[2..4].copy_from_slice(&sum.to_be_bytes());
        }
        // Unknown or truncated transport: lengths are fixed, bytes pass
        // through untouched.
        _ => {}
    }

    Ok(())
}

fn fixup_v6(buffer: &mut [u8]) -> Result<(), SerializeError> {
    const HEADER: usize = crate::protocol::ipv6::HEADER_SIZE;

    let payload_len = buffer.len() - HEADER;
    if payload_len > u16::MAX as usize {
        return Err(SerializeError::Oversize(payload_len));
    }
    buffer[4..6].copy_from_slice(&(payload_len as u16).to_be_bytes());

    let mut src = [0u8; 16];
    src.copy_from_slice(&buffer[8..24]);
    let mut dst = [0u8; 16];
    dst.copy_from_slice(&buffer[24..40]);
    let src = Ipv6Addr::from(src);
    let dst = Ipv6Addr::from(dst);
    let next_header = buffer[6];

    let segment = &mut buffer[HEADER..];
    match next_header {
        ip_proto::TCP if segment.len() >= 20 => {
            segment[16] = 0;
            segment[17] = 0;
            let sum = transport_checksum_v6(src, dst, next_header, segment);
            segment[16..18].copy_from_slice(&sum.to_be_bytes());
        }
        // UDP over IPv6 must carry a checksum (RFC 8200), so always recompute.
        ip_proto::UDP if segment.len() >= 8 => {
            let udp_len = segment.len();
            segment[4..6].copy_from_slice(&(udp_len as u16).to_be_bytes());
            segment[6] = 0;
            segment[7] = 0;
            let sum = transport_checksum_v6(src, dst, next_header, segment);
            segment[6..8].copy_from_slice(&sum.to_be_bytes());
        }
        ip_proto::ICMPV6 if segment.len() >= 4 => {
            segment[2] = 0;
            segment[3] = 0;
            let sum = transport_checksum_v6(src, dst, next_header, segment);
            segment[2..4].copy_from_slice(&sum.to_be_bytes());
        }
        _ => {}
    }

    Ok(())
}

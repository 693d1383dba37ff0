//! UDP header parsing - RFC 768

use crate::error::ParseError;
use crate::protocol::ip_proto;
use std::net::Ipv4Addr;

/// UDP header size (fixed)
pub const HEADER_SIZE: usize = 8;

/// Parsed UDP header (zero-copy reference)
#[derive(Debug, Clone)]
pub struct UdpHeader<'a> {
    buffer: &'a [u8],
}

impl<'a> UdpHeader<'a> {
    pub fn parse(buffer: &'a [u8]) -> Result<Self, ParseError> {
        if buffer.len() < HEADER_SIZE {
            return Err(ParseError::NoTransportLayer {
                protocol: ip_proto::UDP,
                reason: "UDP header too short",
            });
        }

        Ok(Self { buffer })
    }

    pub fn src_port(&self) -> u16 {
        u16::from_be_bytes([self.buffer[0], self.buffer[1]])
    }

    pub fn dst_port(&self) -> u16 {
        u16::from_be_bytes([self.buffer[2], self.buffer[3]])
    }

    /// Declared length (header + data).
    pub fn length(&self) -> u16 {
        u16::from_be_bytes([self.buffer[4], self.buffer[5]])
    }

    /// Zero means the sender did not compute a checksum (legal over IPv4).
    pub fn checksum(&self) -> u16 {
        u16::from_be_bytes([self.buffer[6], self.buffer[7]])
    }

    pub fn payload(&self) -> &'a [u8] {
        &self.buffer[HEADER_SIZE..]
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        self.buffer
    }

    /// Validate against the IPv4 pseudo-header. A zero checksum passes
    /// (checksum disabled).
    pub fn validate_checksum(&self, src_ip: Ipv4Addr, dst_ip: Ipv4Addr) -> bool {
        if self.checksum() == 0 {
            return true;
        }
        super::tcp::transport_checksum_v4(src_ip, dst_ip, ip_proto::UDP, self.buffer) == 0
    }
}

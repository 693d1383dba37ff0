//! IPv4 header parsing - RFC 791

use crate::error::ParseError;
use crate::protocol::internet_checksum;
use std::net::Ipv4Addr;

/// Minimum IPv4 header size (without options)
pub const MIN_HEADER_SIZE: usize = 20;

/// Parsed IPv4 header (zero-copy reference).
///
/// `buffer` holds the full IP datagram as captured; `header_len` accounts for
/// options.
#[derive(Debug, Clone)]
pub struct Ipv4Header<'a> {
    buffer: &'a [u8],
    header_len: usize,
}

impl<'a> Ipv4Header<'a> {
    pub fn parse(buffer: &'a [u8]) -> Result<Self, ParseError> {
        if buffer.len() < MIN_HEADER_SIZE {
            return Err(ParseError::NoNetworkLayer("IPv4 header too short"));
        }

        let version = buffer[0] >> 4;
        if version != 4 {
            return Err(ParseError::NoNetworkLayer("not an IPv4 packet"));
        }

        let ihl = (buffer[0] & 0x0F) as usize;
        let header_len = ihl * 4;

        if header_len < MIN_HEADER_SIZE {
            return Err(ParseError::NoNetworkLayer("IPv4 IHL too small"));
        }

        if buffer.len() < header_len {
            return Err(ParseError::NoNetworkLayer("IPv4 header truncated"));
        }

        Ok(Self { buffer, header_len })
    }

    pub fn version(&self) -> u8 {
        self.buffer[0] >> 4
    }

    pub fn ihl(&self) -> u8 {
        self.buffer[0] & 0x0F
    }

    pub fn dscp(&self) -> u8 {
        self.buffer[1] >> 2
    }

    pub fn ecn(&self) -> u8 {
        self.buffer[1] & 0x03
    }

    /// Declared total length. May disagree with the captured length; the
    /// recompiler trusts the capture, not this field.
    pub fn total_length(&self) -> u16 {
        u16::from_be_bytes([self.buffer[2], self.buffer[3]])
    }

    pub fn identification(&self) -> u16 {
        u16::from_be_bytes([self.buffer[4], self.buffer[5]])
    }

    pub fn flags(&self) -> u8 {
        self.buffer[6] >> 5
    }

    pub fn fragment_offset(&self) -> u16 {
        u16::from_be_bytes([self.buffer[6] & 0x1F, self.buffer[7]])
    }

    pub fn ttl(&self) -> u8 {
        self.buffer[8]
    }

    /// Declared next-protocol number (drives transport dispatch).
    pub fn protocol(&self) -> u8 {
        self.buffer[9]
    }

    pub fn checksum(&self) -> u16 {
        u16::from_be_bytes([self.buffer[10], self.buffer[11]])
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

    pub fn header_len(&self) -> usize {
        self.header_len
    }

    /// Bytes after the IP header (the transport segment).
    pub fn payload(&self) -> &'a [u8] {
        &self.buffer[self.header_len..]
    }

    /// Check if More Fragments is set or the offset is non-zero.
    pub fn is_fragment(&self) -> bool {
        (self.flags() & 0b001) != 0 || self.fragment_offset() > 0
    }

    /// Validate the header checksum.
    pub fn validate_checksum(&self) -> bool {
        internet_checksum(&self.buffer[..self.header_len]) == 0
    }

    /// Raw header bytes (without payload).
    pub fn as_bytes(&self) -> &'a [u8] {
        &self.buffer[..self.header_len]
    }
}

//! TCP header parsing - RFC 793 / RFC 3540 (NS flag)

use crate::error::ParseError;
use crate::protocol::ip_proto;
use std::net::{Ipv4Addr, Ipv6Addr};

/// Minimum TCP header size (without options)
pub const MIN_HEADER_SIZE: usize = 20;

/// The full nine-flag TCP set, decoded explicitly.
///
/// NS lives in the low bit of byte 12 (the data-offset byte); the other eight
/// occupy byte 13.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TcpFlags {
    pub fin: bool,
    pub syn: bool,
    pub rst: bool,
    pub psh: bool,
    pub ack: bool,
    pub urg: bool,
    pub ece: bool,
    pub cwr: bool,
    pub ns: bool,
}

impl TcpFlags {
    /// Decode from the data-offset byte (for NS) and the flag byte.
    pub fn from_bytes(offset_byte: u8, flag_byte: u8) -> Self {
        Self {
            fin: (flag_byte & 0x01) != 0,
            syn: (flag_byte & 0x02) != 0,
            rst: (flag_byte & 0x04) != 0,
            psh: (flag_byte & 0x08) != 0,
            ack: (flag_byte & 0x10) != 0,
            urg: (flag_byte & 0x20) != 0,
            ece: (flag_byte & 0x40) != 0,
            cwr: (flag_byte & 0x80) != 0,
            ns: (offset_byte & 0x01) != 0,
        }
    }

    /// Encode the eight-flag byte (byte 13). NS is not included; it belongs to
    /// byte 12.
    pub fn to_byte(&self) -> u8 {
        let mut byte = 0u8;
        if self.fin {
            byte |= 0x01;
        }
        if self.syn {
            byte |= 0x02;
        }
        if self.rst {
            byte |= 0x04;
        }
        if self.psh {
            byte |= 0x08;
        }
        if self.ack {
            byte |= 0x10;
        }
        if self.urg {
            byte |= 0x20;
        }
        if self.ece {
            byte |= 0x40;
        }
        if self.cwr {
            byte |= 0x80;
        }
        byte
    }

    /// Names of the set flags, in wire-documentation order.
    pub fn names(&self) -> Vec<&'static str> {
        let mut out = Vec::new();
        for (set, name) in [
            (self.fin, "FIN"),
            (self.syn, "SYN"),
            (self.rst, "RST"),
            (self.psh, "PSH"),
            (self.ack, "ACK"),
            (self.urg, "URG"),
            (self.ece, "ECE"),
            (self.cwr, "CWR"),
            (self.ns, "NS"),
        ] {
            if set {
                out.push(name);
            }
        }
        out
    }

    pub fn is_syn_only(&self) -> bool {
        self.syn && !self.ack
    }

    pub fn is_syn_ack(&self) -> bool {
        self.syn && self.ack
    }
}

/// Parsed TCP header (zero-copy reference)
#[derive(Debug, Clone)]
pub struct TcpHeader<'a> {
    buffer: &'a [u8],
    header_len: usize,
}

impl<'a> TcpHeader<'a> {
    pub fn parse(buffer: &'a [u8]) -> Result<Self, ParseError> {
        if buffer.len() < MIN_HEADER_SIZE {
            return Err(ParseError::NoTransportLayer {
                protocol: ip_proto::TCP,
                reason: "TCP header too short",
            });
        }

        let data_offset = (buffer[12] >> 4) as usize;
        let header_len = data_offset * 4;

        if header_len < MIN_HEADER_SIZE {
            return Err(ParseError::NoTransportLayer {
                protocol: ip_proto::TCP,
                reason: "TCP data offset too small",
            });
        }

        if buffer.len() < header_len {
            return Err(ParseError::NoTransportLayer {
                protocol: ip_proto::TCP,
                reason: "TCP header truncated",
            });
        }

        Ok(Self { buffer, header_len })
    }

    pub fn src_port(&self) -> u16 {
        u16::from_be_bytes([self.buffer[0], self.buffer[1]])
    }

    pub fn dst_port(&self) -> u16 {
        u16::from_be_bytes([self.buffer[2], self.buffer[3]])
    }

    pub fn seq_num(&self) -> u32 {
        u32::from_be_bytes([
            self.buffer[4],
            self.buffer[5],
            self.buffer[6],
            self.buffer[7],
        ])
    }

    pub fn ack_num(&self) -> u32 {
        u32::from_be_bytes([
            self.buffer[8],
            self.buffer[9],
            self.buffer[10],
            self.buffer[11],
        ])
    }

    /// Header length in 32-bit words.
    pub fn data_offset(&self) -> u8 {
        self.buffer[12] >> 4
    }

    pub fn flags(&self) -> TcpFlags {
        TcpFlags::from_bytes(self.buffer[12], self.buffer[13])
    }

    pub fn window(&self) -> u16 {
        u16::from_be_bytes([self.buffer[14], self.buffer[15]])
    }

    pub fn checksum(&self) -> u16 {
        u16::from_be_bytes([self.buffer[16], self.buffer[17]])
    }

    pub fn urgent_ptr(&self) -> u16 {
        u16::from_be_bytes([self.buffer[18], self.buffer[19]])
    }

    pub fn header_len(&self) -> usize {
        self.header_len
    }

    pub fn payload(&self) -> &'a [u8] {
        &self.buffer[self.header_len..]
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        self.buffer
    }

    /// Validate the checksum against the IPv4 pseudo-header.
    pub fn validate_checksum(&self, src_ip: Ipv4Addr, dst_ip: Ipv4Addr) -> bool {
        transport_checksum_v4(src_ip, dst_ip, ip_proto::TCP, self.buffer) == 0
    }
}

/// Transport checksum over the IPv4 pseudo-header (RFC 793):
/// source address, destination address, zero, protocol, segment length.
pub fn transport_checksum_v4(
    src_ip: Ipv4Addr,
    dst_ip: Ipv4Addr,
    protocol: u8,
    segment: &[u8],
) -> u16 {
    let mut sum: u32 = 0;

    let src = src_ip.octets();
    let dst = dst_ip.octets();

    sum += u16::from_be_bytes([src[0], src[1]]) as u32;
    sum += u16::from_be_bytes([src[2], src[3]]) as u32;
    sum += u16::from_be_bytes([dst[0], dst[1]]) as u32;
    sum += u16::from_be_bytes([dst[2], dst[3]]) as u32;
    sum += protocol as u32;
    sum += segment.len() as u32;

    checksum_add(sum, segment)
}

/// Transport checksum over the IPv6 pseudo-header (RFC 8200 §8.1).
pub fn transport_checksum_v6(
    src_ip: Ipv6Addr,
    dst_ip: Ipv6Addr,
    protocol: u8,
    segment: &[u8],
) -> u16 {
    let mut sum: u32 = 0;

    for addr in [src_ip, dst_ip] {
        for word in addr.segments() {
            sum += word as u32;
        }
    }
    sum += segment.len() as u32;
    sum += protocol as u32;

    checksum_add(sum, segment)
}

fn checksum_add(mut sum: u32, segment: &[u8]) -> u16 {
    for i in (0..segment.len()).step_by(2) {
        let word = if i + 1 < segment.len() {
            u16::from_be_bytes([segment[i], segment[i + 1]])
        } else {
            u16::from_be_bytes([segment[i], 0])
        };
        sum = sum.wrapping_add(word as u32);
    }

    while sum >> 16 != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }

    !(sum as u16)
}

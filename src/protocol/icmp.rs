//! ICMP header parsing - RFC 792
//!
//! The Echo sub-type gets first-class accessors because most diagnostic policy
//! keys off echo identifier/sequence/data.

use crate::error::ParseError;
use crate::protocol::{internet_checksum, ip_proto};

/// ICMP header size (minimum)
pub const HEADER_SIZE: usize = 8;

/// ICMP message types seen by the inspector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum IcmpType {
    EchoReply = 0,
    DestinationUnreachable = 3,
    Redirect = 5,
    EchoRequest = 8,
    TimeExceeded = 11,
    ParameterProblem = 12,
}

impl IcmpType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(IcmpType::EchoReply),
            3 => Some(IcmpType::DestinationUnreachable),
            5 => Some(IcmpType::Redirect),
            8 => Some(IcmpType::EchoRequest),
            11 => Some(IcmpType::TimeExceeded),
            12 => Some(IcmpType::ParameterProblem),
            _ => None,
        }
    }
}

/// Echo Request/Reply sub-fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EchoBody<'a> {
    pub identifier: u16,
    pub sequence: u16,
    pub data: &'a [u8],
}

/// Parsed ICMP message (zero-copy reference)
#[derive(Debug, Clone)]
pub struct IcmpHeader<'a> {
    buffer: &'a [u8],
}

impl<'a> IcmpHeader<'a> {
    pub fn parse(buffer: &'a [u8]) -> Result<Self, ParseError> {
        if buffer.len() < HEADER_SIZE {
            return Err(ParseError::NoTransportLayer {
                protocol: ip_proto::ICMP,
                reason: "ICMP message too short",
            });
        }

        Ok(Self { buffer })
    }

    pub fn icmp_type(&self) -> u8 {
        self.buffer[0]
    }

    pub fn code(&self) -> u8 {
        self.buffer[1]
    }

    pub fn checksum(&self) -> u16 {
        u16::from_be_bytes([self.buffer[2], self.buffer[3]])
    }

    pub fn message_type(&self) -> Option<IcmpType> {
        IcmpType::from_u8(self.icmp_type())
    }

    pub fn is_echo_request(&self) -> bool {
        self.icmp_type() == IcmpType::EchoRequest as u8
    }

    pub fn is_echo_reply(&self) -> bool {
        self.icmp_type() == IcmpType::EchoReply as u8
    }

    /// Echo identifier/sequence/data, present only for Echo Request/Reply.
    pub fn echo(&self) -> Option<EchoBody<'a>> {
        if !self.is_echo_request() && !self.is_echo_reply() {
            return None;
        }
        Some(EchoBody {
            identifier: u16::from_be_bytes([self.buffer[4], self.buffer[5]]),
            sequence: u16::from_be_bytes([self.buffer[6], self.buffer[7]]),
            data: &self.buffer[HEADER_SIZE..],
        })
    }

    /// Bytes after the fixed 8-byte header. For error messages this is the
    /// embedded original datagram.
    pub fn payload(&self) -> &'a [u8] {
        &self.buffer[HEADER_SIZE..]
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        self.buffer
    }

    /// ICMP checksums cover the whole message, no pseudo-header.
    pub fn validate_checksum(&self) -> bool {
        internet_checksum(self.buffer) == 0
    }
}

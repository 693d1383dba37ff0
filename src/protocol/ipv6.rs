//! IPv6 header parsing - RFC 8200
//!
//! Only the fixed 40-byte header is decoded; a packet whose next header is an
//! extension header surfaces as an unknown transport.

use crate::error::ParseError;
use std::net::Ipv6Addr;

/// IPv6 header size (fixed, unlike IPv4)
pub const HEADER_SIZE: usize = 40;

/// Parsed IPv6 header (zero-copy reference)
#[derive(Debug, Clone)]
pub struct Ipv6Header<'a> {
    buffer: &'a [u8],
}

impl<'a> Ipv6Header<'a> {
    pub fn parse(buffer: &'a [u8]) -> Result<Self, ParseError> {
        if buffer.len() < HEADER_SIZE {
            return Err(ParseError::NoNetworkLayer("IPv6 header too short"));
        }

        let version = buffer[0] >> 4;
        if version != 6 {
            return Err(ParseError::NoNetworkLayer("not an IPv6 packet"));
        }

        Ok(Self { buffer })
    }

    pub fn version(&self) -> u8 {
        self.buffer[0] >> 4
    }

    pub fn traffic_class(&self) -> u8 {
        ((self.buffer[0] & 0x0F) << 4) | (self.buffer[1] >> 4)
    }

    pub fn flow_label(&self) -> u32 {
        u32::from_be_bytes([
            0,
            self.buffer[1] & 0x0F,
            self.buffer[2],
            self.buffer[3],
        ])
    }

    /// Declared payload length (everything after the fixed header).
    pub fn payload_length(&self) -> u16 {
        u16::from_be_bytes([self.buffer[4], self.buffer[5]])
    }

    /// Next-header value (drives transport dispatch, same numbering as the
    /// IPv4 protocol field).
    pub fn next_header(&self) -> u8 {
        self.buffer[6]
    }

    pub fn hop_limit(&self) -> u8 {
        self.buffer[7]
    }

    pub fn src_addr(&self) -> Ipv6Addr {
        let mut octets = [0u8; 16];
        octets.copy_from_slice(&self.buffer[8..24]);
        Ipv6Addr::from(octets)
    }

    pub fn dst_addr(&self) -> Ipv6Addr {
        let mut octets = [0u8; 16];
        octets.copy_from_slice(&self.buffer[24..40]);
        Ipv6Addr::from(octets)
    }

    pub fn header_len(&self) -> usize {
        HEADER_SIZE
    }

    pub fn payload(&self) -> &'a [u8] {
        &self.buffer[HEADER_SIZE..]
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        &self.buffer[..HEADER_SIZE]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_packet(next_header: u8, payload: &[u8]) -> Vec<u8> {
        let mut pkt = vec![0u8; HEADER_SIZE];
        pkt[0] = 0x60;
        pkt[4..6].copy_from_slice(&(payload.len() as u16).to_be_bytes());
        pkt[6] = next_header;
        pkt[7] = 64;
        pkt[8..24].copy_from_slice(&"2001:db8::1".parse::<Ipv6Addr>().unwrap().octets());
        pkt[24..40].copy_from_slice(&"2001:db8::2".parse::<Ipv6Addr>().unwrap().octets());
        pkt.extend_from_slice(payload);
        pkt
    }

    #[test]
    fn parse_fields() {
        let pkt = make_packet(17, &[1, 2, 3, 4]);
        let hdr = Ipv6Header::parse(&pkt).unwrap();

        assert_eq!(hdr.version(), 6);
        assert_eq!(hdr.payload_length(), 4);
        assert_eq!(hdr.next_header(), 17);
        assert_eq!(hdr.hop_limit(), 64);
        assert_eq!(hdr.src_addr(), "2001:db8::1".parse::<Ipv6Addr>().unwrap());
        assert_eq!(hdr.dst_addr(), "2001:db8::2".parse::<Ipv6Addr>().unwrap());
        assert_eq!(hdr.payload(), &[1, 2, 3, 4]);
    }

    #[test]
    fn parse_too_short() {
        assert!(Ipv6Header::parse(&[0x60u8; 39]).is_err());
    }

    #[test]
    fn parse_wrong_version() {
        let mut pkt = make_packet(6, &[]);
        pkt[0] = 0x40;
        assert!(matches!(
            Ipv6Header::parse(&pkt),
            Err(ParseError::NoNetworkLayer(_))
        ));
    }
}

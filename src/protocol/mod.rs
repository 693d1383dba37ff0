//! Network and transport header parsers.
//!
//! Zero-copy views over raw capture bytes. Every parser is total: any input
//! produces either a typed header or a [`ParseError`](crate::error::ParseError),
//! never a panic.

pub mod icmp;
pub mod ipv4;
pub mod ipv6;
pub mod tcp;
pub mod udp;

/// IP protocol numbers recognized by the transport dispatch.
pub mod ip_proto {
    pub const ICMP: u8 = 1;
    pub const TCP: u8 = 6;
    pub const UDP: u8 = 17;
    pub const ICMPV6: u8 = 58;
}

/// Internet checksum (RFC 1071): 16-bit one's complement sum over `data`,
/// zero-padded to even length.
pub fn internet_checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = 0;

    for i in (0..data.len()).step_by(2) {
        let word = if i + 1 < data.len() {
            u16::from_be_bytes([data[i], data[i + 1]])
        } else {
            u16::from_be_bytes([data[i], 0])
        };
        sum = sum.wrapping_add(word as u32);
    }

    // Fold 32-bit sum to 16 bits
    while sum >> 16 != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }

    !(sum as u16)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_of_valid_header_is_zero() {
        // IPv4 header with its correct checksum in place sums to zero.
        let mut hdr = vec![
            0x45, 0x00, 0x00, 0x1c, 0x00, 0x00, 0x40, 0x00, 0x40, 0x01, 0x00, 0x00, 192, 168, 1,
            1, 192, 168, 1, 2,
        ];
        let sum = internet_checksum(&hdr);
        hdr[10..12].copy_from_slice(&sum.to_be_bytes());
        assert_eq!(internet_checksum(&hdr), 0);
    }

    #[test]
    fn checksum_odd_length_does_not_panic() {
        let data = [0x45u8, 0x00, 0x00, 0x1c, 0x00];
        let _ = internet_checksum(&data);
    }

    #[test]
    fn checksum_empty() {
        assert_eq!(internet_checksum(&[]), 0xFFFF);
    }
}

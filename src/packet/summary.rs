//! Per-packet diagnostic summaries.
//!
//! The textual format is a logging concern, but the exposed data elements
//! (5-tuple, flag names, bounded payload preview) are part of the observable
//! contract consumed by inspection callbacks.

use crate::packet::{ParsedPacket, TransportHeader};
use std::fmt;
use std::net::IpAddr;

/// Structured one-line view of a parsed packet.
#[derive(Debug, Clone)]
pub struct PacketSummary {
    pub src: Option<IpAddr>,
    pub dst: Option<IpAddr>,
    pub src_port: Option<u16>,
    pub dst_port: Option<u16>,
    pub protocol: &'static str,
    pub seq: Option<u32>,
    pub ack: Option<u32>,
    pub flags: Vec<&'static str>,
    pub icmp_echo: Option<(u16, u16)>,
    pub preview: String,
}

impl PacketSummary {
    /// Summarize `parsed`, previewing at most `preview_limit` payload bytes.
    pub fn of(parsed: &ParsedPacket<'_>, preview_limit: usize) -> Self {
        let (protocol, seq, ack, flags, icmp_echo) = match &parsed.transport {
            TransportHeader::Tcp(tcp) => (
                "TCP",
                Some(tcp.seq_num()),
                Some(tcp.ack_num()),
                tcp.flags().names(),
                None,
            ),
            TransportHeader::Udp(_) => ("UDP", None, None, Vec::new(), None),
            TransportHeader::Icmp(icmp) => (
                "ICMP",
                None,
                None,
                Vec::new(),
                icmp.echo().map(|e| (e.identifier, e.sequence)),
            ),
            TransportHeader::Unknown { .. } => ("?", None, None, Vec::new(), None),
        };

        Self {
            src: parsed.src_addr(),
            dst: parsed.dst_addr(),
            src_port: parsed.src_port(),
            dst_port: parsed.dst_port(),
            protocol,
            seq,
            ack,
            flags,
            icmp_echo,
            preview: printable_preview(parsed.payload(), preview_limit),
        }
    }
}

impl fmt::Display for PacketSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ", self.protocol)?;

        match (self.src, self.src_port) {
            (Some(ip), Some(port)) => write!(f, "{}:{}", ip, port)?,
            (Some(ip), None) => write!(f, "{}", ip)?,
            _ => write!(f, "?")?,
        }
        write!(f, " -> ")?;
        match (self.dst, self.dst_port) {
            (Some(ip), Some(port)) => write!(f, "{}:{}", ip, port)?,
            (Some(ip), None) => write!(f, "{}", ip)?,
            _ => write!(f, "?")?,
        }

        if let (Some(seq), Some(ack)) = (self.seq, self.ack) {
            write!(f, " seq={} ack={}", seq, ack)?;
        }
        for flag in &self.flags {
            write!(f, " {}", flag)?;
        }
        if let Some((id, seq)) = self.icmp_echo {
            write!(f, " echo id={} seq={}", id, seq)?;
        }
        if !self.preview.is_empty() {
            write!(f, " payload=\"{}\"", self.preview)?;
        }
        Ok(())
    }
}

/// Render up to `limit` bytes with non-printables as dots.
pub fn printable_preview(data: &[u8], limit: usize) -> String {
    data.iter()
        .take(limit)
        .map(|&b| if (32..=126).contains(&b) { b as char } else { '.' })
        .collect()
}

/// Hex rendition of up to `limit` bytes, for packets that did not decode.
pub fn hex_preview(data: &[u8], limit: usize) -> String {
    let mut out = String::with_capacity(data.len().min(limit) * 2 + 3);
    for b in data.iter().take(limit) {
        out.push_str(&format!("{:02x}", b));
    }
    if data.len() > limit {
        out.push_str("...");
    }
    out
}

//! Error taxonomy.
//!
//! Four distinct failure classes with different blast radii:
//! - [`ParseError`] / [`SerializeError`]: per-packet, recoverable. The session
//!   logs them, falls back to a conservative verdict and keeps running.
//! - [`BindError`]: fatal to one bind attempt. The outer driver may retry.
//! - [`RunError`]: ends the current session. The outer driver decides whether
//!   to rebind.

use std::io;

/// Boxed error returned by an inspection callback.
pub type InspectError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Per-packet decode failure. Recoverable: the packet still gets a verdict.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// The bytes do not form a recognizable IPv4/IPv6 header.
    #[error("no network layer: {0}")]
    NoNetworkLayer(&'static str),

    /// The network layer decoded, but its declared next protocol could not.
    /// Network-layer fields remain accessible via
    /// [`ParsedPacket::parse_network`](crate::packet::ParsedPacket::parse_network).
    #[error("no transport layer for protocol {protocol}: {reason}")]
    NoTransportLayer { protocol: u8, reason: &'static str },
}

/// Per-packet re-serialization failure. A packet that cannot be recompiled is
/// never forwarded with stale checksums; the caller falls back to the original
/// bytes or drops.
#[derive(Debug, thiserror::Error)]
pub enum SerializeError {
    /// Checksum recomputation needs the network-layer pseudo-header.
    #[error("cannot recompile a packet without a decoded network layer")]
    NoNetworkLayer,

    /// Field mutation is only supported for IPv4 packets.
    #[error("mutation requires an IPv4 network layer")]
    Ipv4Only,

    /// Port mutation on a packet whose transport layer has no port fields.
    #[error("transport layer has no port fields")]
    NoTransportPorts,

    /// The serialized size no longer fits the 16-bit length field.
    #[error("packet length {0} exceeds the 16-bit length field")]
    Oversize(usize),
}

/// Failure to acquire or configure the kernel queue. Fatal to this session
/// only; a fresh bind may succeed later.
#[derive(Debug, thiserror::Error)]
pub enum BindError {
    #[error("invalid queue config: {0}")]
    InvalidConfig(String),

    #[error("could not open netfilter netlink socket: {0}")]
    Socket(#[source] io::Error),

    #[error("could not bind netlink socket: {0}")]
    Bind(#[source] io::Error),

    /// The kernel rejected a queue configuration message (permission denied,
    /// queue already bound, nfnetlink_queue not available).
    #[error("kernel rejected configuration of queue {queue}: {source}")]
    Configure {
        queue: u16,
        #[source]
        source: io::Error,
    },
}

/// Session-ending failure inside the run loop.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("receive from queue failed: {0}")]
    Recv(#[source] io::Error),

    #[error("malformed queue message: {0}")]
    Protocol(&'static str),

    #[error("verdict send failed for packet {id}: {source}")]
    Verdict {
        id: u32,
        #[source]
        source: io::Error,
    },

    /// The inspection callback failed. The offending packet was still given a
    /// default accept verdict before this was raised.
    #[error("inspection callback failed: {0}")]
    Inspector(#[source] InspectError),
}

/// Crate-level umbrella error for the binary surface.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Serialize(#[from] SerializeError),

    #[error(transparent)]
    Bind(#[from] BindError),

    #[error(transparent)]
    Run(#[from] RunError),
}

pub type Result<T> = std::result::Result<T, Error>;

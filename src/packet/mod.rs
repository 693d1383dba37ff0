//! Packet-level pipeline: parse raw capture bytes into typed layers,
//! summarize them for diagnostics, and recompile (possibly mutated) packets
//! back to wire bytes.

mod parse;
mod recompile;
mod summary;

pub use parse::{NetworkHeader, ParsedPacket, TransportHeader};
pub use recompile::{recompile, MutablePacket};
pub use summary::{hex_preview, printable_preview, PacketSummary};

//! Userspace side of the kernel packet queue.
//!
//! [`NfqueueSocket`] speaks the netlink wire protocol to the nfnetlink_queue
//! subsystem. [`Session`] drives the read-inspect-verdict loop on top of any
//! [`QueueTransport`], which keeps the loop testable without a kernel.

pub mod netlink;
pub mod session;

pub use netlink::NfqueueSocket;
pub use session::Session;

use crate::error::RunError;
use std::future::Future;
use std::time::Duration;

/// How much of each queued packet the kernel copies to userspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyMode {
    /// Metadata only, no payload bytes.
    Meta,
    /// Metadata plus payload, up to the configured copy range.
    Packet,
}

impl CopyMode {
    pub(crate) fn wire_value(self) -> u8 {
        match self {
            CopyMode::Meta => 1,
            CopyMode::Packet => 2,
        }
    }
}

/// Parameters for binding one queue.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Queue number packets are diverted to by the firewall ruleset.
    pub queue_num: u16,
    /// Largest payload copy the kernel is asked for.
    pub max_packet_len: u32,
    /// Kernel-side backlog before the kernel starts dropping.
    pub max_queue_len: u32,
    /// Payload copy mode.
    pub copy_mode: CopyMode,
    /// Bound on a single event read.
    pub read_timeout: Duration,
    /// Bound on a single verdict write.
    pub write_timeout: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            queue_num: 0,
            max_packet_len: 0xFFFF,
            max_queue_len: 0xFF,
            copy_mode: CopyMode::Packet,
            read_timeout: Duration::from_millis(10),
            write_timeout: Duration::from_millis(15),
        }
    }
}

impl QueueConfig {
    /// Checks the parameters before any socket work happens.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_packet_len == 0 {
            return Err("max_packet_len must be non-zero".to_string());
        }
        if self.max_packet_len > 0xFFFF {
            return Err(format!(
                "max_packet_len {} exceeds the 65535-byte datagram limit",
                self.max_packet_len
            ));
        }
        if self.max_queue_len == 0 {
            return Err("max_queue_len must be non-zero".to_string());
        }
        if self.read_timeout.is_zero() {
            return Err("read_timeout must be non-zero".to_string());
        }
        if self.write_timeout.is_zero() {
            return Err("write_timeout must be non-zero".to_string());
        }
        Ok(())
    }
}

/// Link-layer metadata the kernel attaches when it is available.
///
/// Locally generated outbound packets have no source MAC yet, so this is
/// optional per event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkLayerMeta {
    pub hw_addr: Vec<u8>,
    pub hw_protocol: u16,
}

/// One packet pulled off the queue, still awaiting a verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPacketEvent {
    /// Kernel-assigned id the verdict must quote back.
    pub id: u32,
    /// Raw bytes starting at the network layer.
    pub payload: Vec<u8>,
    pub link_layer: Option<LinkLayerMeta>,
}

/// Decision for one queued packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Let the packet continue through the stack.
    Accept,
    /// Discard the packet silently.
    Drop,
    /// Accept, but with the packet bytes replaced.
    Modify(Vec<u8>),
}

/// Source of packet events and sink for verdicts.
///
/// [`NfqueueSocket`] is the real implementation; tests substitute scripted
/// transports.
pub trait QueueTransport: Send {
    /// Waits up to `timeout` for the next event. `Ok(None)` means the timeout
    /// elapsed with nothing queued.
    fn next_event(
        &mut self,
        timeout: Duration,
    ) -> impl Future<Output = Result<Option<RawPacketEvent>, RunError>> + Send;

    /// Delivers the verdict for packet `id` within `timeout`.
    fn send_verdict(
        &mut self,
        id: u32,
        verdict: &Verdict,
        timeout: Duration,
    ) -> impl Future<Output = Result<(), RunError>> + Send;
}

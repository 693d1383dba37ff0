//! Inspection callbacks: the policy seam between capture and verdict.

use crate::error::InspectError;
use crate::packet::{hex_preview, PacketSummary, ParsedPacket};
use crate::queue::{RawPacketEvent, Verdict};
use tracing::info;

/// Decides the verdict for each queued packet.
///
/// `parsed` is `None` when the bytes did not decode even to a network layer;
/// the raw event is always available. Returning an error ends the session,
/// but the offending packet is still accepted first.
pub trait Inspect: Send {
    fn inspect(
        &mut self,
        event: &RawPacketEvent,
        parsed: Option<&ParsedPacket<'_>>,
    ) -> Result<Verdict, InspectError>;
}

impl<F> Inspect for F
where
    F: FnMut(&RawPacketEvent, Option<&ParsedPacket<'_>>) -> Result<Verdict, InspectError> + Send,
{
    fn inspect(
        &mut self,
        event: &RawPacketEvent,
        parsed: Option<&ParsedPacket<'_>>,
    ) -> Result<Verdict, InspectError> {
        self(event, parsed)
    }
}

/// Logs a one-line summary per packet and accepts everything.
///
/// The passive observer mode: useful for traffic visibility before any
/// drop/modify policy exists.
#[derive(Debug, Clone)]
pub struct LogInspector {
    /// Cap on previewed payload bytes per packet.
    pub preview_limit: usize,
}

impl Default for LogInspector {
    fn default() -> Self {
        Self { preview_limit: 100 }
    }
}

impl Inspect for LogInspector {
    fn inspect(
        &mut self,
        event: &RawPacketEvent,
        parsed: Option<&ParsedPacket<'_>>,
    ) -> Result<Verdict, InspectError> {
        match parsed {
            Some(parsed) => {
                let summary = PacketSummary::of(parsed, self.preview_limit);
                info!(id = event.id, "{}", summary);
            }
            None => {
                info!(
                    id = event.id,
                    len = event.payload.len(),
                    raw = %hex_preview(&event.payload, self.preview_limit),
                    "undecodable packet"
                );
            }
        }
        Ok(Verdict::Accept)
    }
}

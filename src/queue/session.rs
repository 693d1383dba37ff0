//! Read-inspect-verdict loop over a queue transport.

use crate::error::{BindError, ParseError, RunError};
use crate::inspect::Inspect;
use crate::packet::{hex_preview, ParsedPacket};
use crate::queue::{NfqueueSocket, QueueConfig, QueueTransport, RawPacketEvent, Verdict};
use crate::telemetry::QueueStats;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// One bound queue and its event loop.
///
/// Strictly sequential: each event is verdicted before the next read, so
/// every packet the kernel hands over gets exactly one verdict while the
/// session lives.
#[derive(Debug)]
pub struct Session<T: QueueTransport> {
    transport: T,
    config: QueueConfig,
    stats: Arc<QueueStats>,
}

impl Session<NfqueueSocket> {
    /// Validates `config` and binds the kernel queue.
    pub fn open(config: QueueConfig) -> Result<Self, BindError> {
        config.validate().map_err(BindError::InvalidConfig)?;
        let transport = NfqueueSocket::open(&config)?;
        Ok(Self::with_transport(config, transport))
    }
}

impl<T: QueueTransport> Session<T> {
    /// Wraps an already-connected transport. Entry point for tests.
    pub fn with_transport(config: QueueConfig, transport: T) -> Self {
        Self {
            transport,
            config,
            stats: Arc::new(QueueStats::new()),
        }
    }

    pub fn queue_num(&self) -> u16 {
        self.config.queue_num
    }

    /// Shared handle to this session's counters.
    pub fn stats(&self) -> Arc<QueueStats> {
        Arc::clone(&self.stats)
    }

    /// Drives the loop until `deadline` elapses (forever if `None`), the
    /// transport fails, or the inspector errors.
    ///
    /// The deadline is checked between packets, never mid-verdict: an event
    /// that has been read is always verdicted before the loop exits.
    pub async fn run<I: Inspect>(
        &mut self,
        deadline: Option<Duration>,
        inspector: &mut I,
    ) -> Result<(), RunError> {
        let deadline = deadline.map(|d| Instant::now() + d);

        loop {
            let read_timeout = match deadline {
                Some(at) => {
                    let remaining = at.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        debug!(queue = self.config.queue_num, "deadline reached");
                        return Ok(());
                    }
                    self.config.read_timeout.min(remaining)
                }
                None => self.config.read_timeout,
            };

            match self.transport.next_event(read_timeout).await? {
                Some(event) => self.handle_event(event, inspector).await?,
                // Timed out with nothing queued; re-check the deadline.
                None => continue,
            }
        }
    }

    async fn handle_event<I: Inspect>(
        &mut self,
        event: RawPacketEvent,
        inspector: &mut I,
    ) -> Result<(), RunError> {
        self.stats.received.inc();
        self.stats.bytes_received.add(event.payload.len() as u64);

        let parsed = match ParsedPacket::parse(&event.payload) {
            Ok(parsed) => Some(parsed),
            Err(ParseError::NoTransportLayer { protocol, reason }) => {
                self.stats.parse_failures.inc();
                debug!(
                    queue = self.config.queue_num,
                    id = event.id,
                    protocol,
                    reason,
                    "transport layer did not decode"
                );
                // Network-layer fields are still usable.
                ParsedPacket::parse_network(&event.payload).ok()
            }
            Err(ParseError::NoNetworkLayer(reason)) => {
                self.stats.parse_failures.inc();
                debug!(
                    queue = self.config.queue_num,
                    id = event.id,
                    reason,
                    raw = %hex_preview(&event.payload, 64),
                    "packet did not decode"
                );
                None
            }
        };

        let verdict = match inspector.inspect(&event, parsed.as_ref()) {
            Ok(verdict) => verdict,
            Err(err) => {
                // The packet must not be left in limbo: accept it, then
                // surface the callback failure.
                warn!(
                    queue = self.config.queue_num,
                    id = event.id,
                    "inspector failed, accepting packet"
                );
                if let Err(send_err) = self
                    .transport
                    .send_verdict(event.id, &Verdict::Accept, self.config.write_timeout)
                    .await
                {
                    warn!(
                        queue = self.config.queue_num,
                        id = event.id,
                        %send_err,
                        "default accept after inspector failure did not send"
                    );
                } else {
                    self.stats.accepted.inc();
                }
                return Err(RunError::Inspector(err));
            }
        };

        match &verdict {
            Verdict::Accept => self.stats.accepted.inc(),
            Verdict::Drop => self.stats.dropped.inc(),
            Verdict::Modify(_) => self.stats.modified.inc(),
        }

        self.transport
            .send_verdict(event.id, &verdict, self.config.write_timeout)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inspect::Inspect;
    use std::collections::VecDeque;

    /// Scripted transport: hands out queued events, records verdicts.
    struct MockTransport {
        events: VecDeque<RawPacketEvent>,
        verdicts: Vec<(u32, Verdict)>,
        /// When the script runs dry, either stall (deadline tests) or fail.
        fail_when_empty: bool,
    }

    impl MockTransport {
        fn with_events(events: Vec<RawPacketEvent>) -> Self {
            Self {
                events: events.into(),
                verdicts: Vec::new(),
                fail_when_empty: false,
            }
        }
    }

    impl QueueTransport for MockTransport {
        async fn next_event(
            &mut self,
            timeout: Duration,
        ) -> Result<Option<RawPacketEvent>, RunError> {
            if let Some(event) = self.events.pop_front() {
                return Ok(Some(event));
            }
            if self.fail_when_empty {
                return Err(RunError::Recv(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "socket gone",
                )));
            }
            tokio::time::sleep(timeout).await;
            Ok(None)
        }

        async fn send_verdict(
            &mut self,
            id: u32,
            verdict: &Verdict,
            _timeout: Duration,
        ) -> Result<(), RunError> {
            self.verdicts.push((id, verdict.clone()));
            Ok(())
        }
    }

    fn event(id: u32, payload: &[u8]) -> RawPacketEvent {
        RawPacketEvent {
            id,
            payload: payload.to_vec(),
            link_layer: None,
        }
    }

    fn minimal_udp_packet() -> Vec<u8> {
        let mut pkt = vec![0u8; 28];
        pkt[0] = 0x45;
        pkt[2..4].copy_from_slice(&28u16.to_be_bytes());
        pkt[8] = 64;
        pkt[9] = 17;
        pkt[12..16].copy_from_slice(&[10, 0, 0, 1]);
        pkt[16..20].copy_from_slice(&[10, 0, 0, 2]);
        pkt[20..22].copy_from_slice(&5000u16.to_be_bytes());
        pkt[22..24].copy_from_slice(&53u16.to_be_bytes());
        pkt[24..26].copy_from_slice(&8u16.to_be_bytes());
        pkt
    }

    struct AcceptAll;
    impl Inspect for AcceptAll {
        fn inspect(
            &mut self,
            _event: &RawPacketEvent,
            _parsed: Option<&ParsedPacket<'_>>,
        ) -> Result<Verdict, crate::error::InspectError> {
            Ok(Verdict::Accept)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_stops_an_idle_session() {
        let transport = MockTransport::with_events(Vec::new());
        let mut session = Session::with_transport(QueueConfig::default(), transport);

        let started = Instant::now();
        session
            .run(Some(Duration::from_secs(10)), &mut AcceptAll)
            .await
            .unwrap();
        // Paused clock: elapsed time is exactly the slept time.
        assert_eq!(started.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn every_event_gets_exactly_one_verdict_in_order() {
        let payload = minimal_udp_packet();
        let transport = MockTransport::with_events(vec![
            event(1, &payload),
            event(2, &payload),
            event(3, b"not a packet"),
        ]);
        let mut session = Session::with_transport(QueueConfig::default(), transport);

        let mut verdicts = VecDeque::from(vec![Verdict::Accept, Verdict::Drop, Verdict::Accept]);
        let mut inspector = |_: &RawPacketEvent,
                             _: Option<&ParsedPacket<'_>>|
         -> Result<Verdict, crate::error::InspectError> {
            Ok(verdicts.pop_front().unwrap())
        };

        session
            .run(Some(Duration::from_millis(50)), &mut inspector)
            .await
            .unwrap();

        assert_eq!(session.transport.verdicts.len(), 3);
        assert_eq!(session.transport.verdicts[0], (1, Verdict::Accept));
        assert_eq!(session.transport.verdicts[1], (2, Verdict::Drop));
        assert_eq!(session.transport.verdicts[2], (3, Verdict::Accept));

        let stats = session.stats();
        assert_eq!(stats.received.get(), 3);
        assert_eq!(stats.accepted.get(), 2);
        assert_eq!(stats.dropped.get(), 1);
        assert_eq!(stats.parse_failures.get(), 1);
    }

    #[tokio::test]
    async fn unparseable_packet_reaches_the_inspector_without_headers() {
        let transport = MockTransport::with_events(vec![event(9, b"\xff\xff\xff")]);
        let mut session = Session::with_transport(QueueConfig::default(), transport);

        let mut saw_unparsed = false;
        let mut inspector = |event: &RawPacketEvent,
                             parsed: Option<&ParsedPacket<'_>>|
         -> Result<Verdict, crate::error::InspectError> {
            assert_eq!(event.id, 9);
            saw_unparsed = parsed.is_none();
            Ok(Verdict::Accept)
        };

        session
            .run(Some(Duration::from_millis(50)), &mut inspector)
            .await
            .unwrap();
        assert!(saw_unparsed);
        assert_eq!(session.transport.verdicts, vec![(9, Verdict::Accept)]);
    }

    #[tokio::test]
    async fn inspector_error_still_accepts_the_packet() {
        let payload = minimal_udp_packet();
        let transport = MockTransport::with_events(vec![event(42, &payload), event(43, &payload)]);
        let mut session = Session::with_transport(QueueConfig::default(), transport);

        let mut inspector = |_: &RawPacketEvent,
                             _: Option<&ParsedPacket<'_>>|
         -> Result<Verdict, crate::error::InspectError> {
            Err("policy backend unavailable".into())
        };

        let err = session.run(None, &mut inspector).await.unwrap_err();
        assert!(matches!(err, RunError::Inspector(_)));

        // The failing packet was verdicted; the session stopped before the next.
        assert_eq!(session.transport.verdicts, vec![(42, Verdict::Accept)]);
        assert_eq!(session.stats().accepted.get(), 1);
    }

    #[tokio::test]
    async fn modify_verdict_carries_replacement_bytes() {
        let payload = minimal_udp_packet();
        let transport = MockTransport::with_events(vec![event(5, &payload)]);
        let mut session = Session::with_transport(QueueConfig::default(), transport);

        let replacement = vec![1u8, 2, 3];
        let bytes = replacement.clone();
        let mut inspector = move |_: &RawPacketEvent,
                                  _: Option<&ParsedPacket<'_>>|
         -> Result<Verdict, crate::error::InspectError> {
            Ok(Verdict::Modify(bytes.clone()))
        };

        session
            .run(Some(Duration::from_millis(50)), &mut inspector)
            .await
            .unwrap();

        assert_eq!(
            session.transport.verdicts,
            vec![(5, Verdict::Modify(replacement))]
        );
        assert_eq!(session.stats().modified.get(), 1);
    }

    #[tokio::test]
    async fn transport_failure_ends_the_session() {
        let payload = minimal_udp_packet();
        let mut transport = MockTransport::with_events(vec![event(1, &payload)]);
        transport.fail_when_empty = true;
        let mut session = Session::with_transport(QueueConfig::default(), transport);

        let err = session.run(None, &mut AcceptAll).await.unwrap_err();
        assert!(matches!(err, RunError::Recv(_)));
        // The event read before the failure was still verdicted.
        assert_eq!(session.transport.verdicts.len(), 1);
    }

    #[test]
    fn open_rejects_invalid_config() {
        let mut config = QueueConfig::default();
        config.max_packet_len = 0;
        let err = Session::open(config).unwrap_err();
        assert!(matches!(err, BindError::InvalidConfig(_)));
    }
}

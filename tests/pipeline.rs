//! Full-pipeline tests over a scripted transport: capture bytes in, typed
//! headers through inspection, verdict (and rewritten bytes) out.

use nfspect::error::{InspectError, RunError};
use nfspect::inspect::Inspect;
use nfspect::packet::{MutablePacket, NetworkHeader, ParsedPacket};
use nfspect::protocol::tcp::{transport_checksum_v4, TcpHeader};
use nfspect::protocol::{internet_checksum, ip_proto};
use nfspect::queue::{QueueConfig, QueueTransport, RawPacketEvent, Session, Verdict};
use std::collections::VecDeque;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Hands out scripted events and records verdicts into a shared log the test
/// keeps a handle to.
struct ScriptedTransport {
    events: VecDeque<RawPacketEvent>,
    verdicts: Arc<Mutex<Vec<(u32, Verdict)>>>,
}

impl ScriptedTransport {
    fn new(events: Vec<RawPacketEvent>) -> (Self, Arc<Mutex<Vec<(u32, Verdict)>>>) {
        let verdicts = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                events: events.into(),
                verdicts: verdicts.clone(),
            },
            verdicts,
        )
    }
}

impl QueueTransport for ScriptedTransport {
    async fn next_event(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<RawPacketEvent>, RunError> {
        match self.events.pop_front() {
            Some(event) => Ok(Some(event)),
            None => {
                tokio::time::sleep(timeout).await;
                Ok(None)
            }
        }
    }

    async fn send_verdict(
        &mut self,
        id: u32,
        verdict: &Verdict,
        _timeout: Duration,
    ) -> Result<(), RunError> {
        self.verdicts.lock().unwrap().push((id, verdict.clone()));
        Ok(())
    }
}

fn tcp_packet(src_port: u16, dst_port: u16, payload: &[u8]) -> Vec<u8> {
    let mut seg = vec![0u8; 20];
    seg[0..2].copy_from_slice(&src_port.to_be_bytes());
    seg[2..4].copy_from_slice(&dst_port.to_be_bytes());
    seg[4..8].copy_from_slice(&1u32.to_be_bytes());
    seg[12] = 0x50;
    seg[13] = 0x18; // PSH+ACK
    seg.extend_from_slice(payload);

    let total = 20 + seg.len();
    let mut pkt = vec![0u8; 20];
    pkt[0] = 0x45;
    pkt[2..4].copy_from_slice(&(total as u16).to_be_bytes());
    pkt[8] = 64;
    pkt[9] = ip_proto::TCP;
    pkt[12..16].copy_from_slice(&[192, 168, 1, 10]);
    pkt[16..20].copy_from_slice(&[93, 184, 216, 34]);
    let sum = internet_checksum(&pkt[..20]);
    pkt[10..12].copy_from_slice(&sum.to_be_bytes());

    let tsum = transport_checksum_v4(
        Ipv4Addr::new(192, 168, 1, 10),
        Ipv4Addr::new(93, 184, 216, 34),
        ip_proto::TCP,
        &seg,
    );
    seg[16..18].copy_from_slice(&tsum.to_be_bytes());
    pkt.extend_from_slice(&seg);
    pkt
}

fn event(id: u32, payload: Vec<u8>) -> RawPacketEvent {
    RawPacketEvent {
        id,
        payload,
        link_layer: None,
    }
}

/// Drops telnet, redirects HTTP to a proxy port, accepts the rest.
struct PortPolicy;

impl Inspect for PortPolicy {
    fn inspect(
        &mut self,
        _event: &RawPacketEvent,
        parsed: Option<&ParsedPacket<'_>>,
    ) -> Result<Verdict, InspectError> {
        let Some(parsed) = parsed else {
            return Ok(Verdict::Accept);
        };
        match parsed.dst_port() {
            Some(23) => Ok(Verdict::Drop),
            Some(80) => {
                let mut mutable = MutablePacket::from_parsed(parsed)?;
                mutable.set_dst_port(8080)?;
                Ok(Verdict::Modify(mutable.recompile()?))
            }
            _ => Ok(Verdict::Accept),
        }
    }
}

#[tokio::test]
async fn policy_drives_all_three_verdicts() {
    let (transport, verdicts) = ScriptedTransport::new(vec![
        event(1, tcp_packet(40000, 443, b"tls hello")),
        event(2, tcp_packet(40001, 23, b"login")),
        event(3, tcp_packet(40002, 80, b"GET / HTTP/1.1\r\n")),
    ]);
    let mut session = Session::with_transport(QueueConfig::default(), transport);
    let stats = session.stats();

    session
        .run(Some(Duration::from_millis(50)), &mut PortPolicy)
        .await
        .unwrap();

    let verdicts = verdicts.lock().unwrap();
    assert_eq!(verdicts.len(), 3);
    assert_eq!(verdicts[0], (1, Verdict::Accept));
    assert_eq!(verdicts[1], (2, Verdict::Drop));
    assert!(matches!(verdicts[2], (3, Verdict::Modify(_))));

    assert_eq!(stats.received.get(), 3);
    assert_eq!(stats.accepted.get(), 1);
    assert_eq!(stats.dropped.get(), 1);
    assert_eq!(stats.modified.get(), 1);
}

#[tokio::test]
async fn modified_bytes_are_wire_valid() {
    let (transport, verdicts) = ScriptedTransport::new(vec![event(
        7,
        tcp_packet(40002, 80, b"GET / HTTP/1.1\r\n"),
    )]);
    let mut session = Session::with_transport(QueueConfig::default(), transport);

    let mut inspector = |_: &RawPacketEvent,
                         parsed: Option<&ParsedPacket<'_>>|
     -> Result<Verdict, InspectError> {
        let parsed = parsed.ok_or("expected a parsed packet")?;
        let mut mutable = MutablePacket::from_parsed(parsed)?;
        mutable.set_dst_port(8080)?;
        mutable.replace_payload(b"GET /proxied HTTP/1.1\r\n");
        Ok(Verdict::Modify(mutable.recompile()?))
    };

    session
        .run(Some(Duration::from_millis(50)), &mut inspector)
        .await
        .unwrap();

    let verdicts = verdicts.lock().unwrap();
    let (id, Verdict::Modify(bytes)) = &verdicts[0] else {
        panic!("expected a modify verdict");
    };
    assert_eq!(*id, 7);

    // The rewritten packet must decode cleanly with consistent lengths and
    // checksums.
    let reparsed = ParsedPacket::parse(bytes).unwrap();
    assert_eq!(reparsed.dst_port(), Some(8080));
    assert_eq!(reparsed.payload(), b"GET /proxied HTTP/1.1\r\n");

    let NetworkHeader::V4(ip) = &reparsed.network else {
        panic!("expected IPv4");
    };
    assert_eq!(ip.total_length() as usize, bytes.len());
    assert!(ip.validate_checksum());

    let tcp = TcpHeader::parse(&bytes[20..]).unwrap();
    assert!(tcp.validate_checksum(ip.src_addr(), ip.dst_addr()));
}

#[tokio::test]
async fn garbage_events_still_get_verdicts() {
    let (transport, verdicts) = ScriptedTransport::new(vec![
        event(1, vec![0xDE, 0xAD, 0xBE, 0xEF]),
        event(2, Vec::new()),
        event(3, tcp_packet(1000, 443, b"")),
    ]);
    let mut session = Session::with_transport(QueueConfig::default(), transport);

    session
        .run(Some(Duration::from_millis(50)), &mut PortPolicy)
        .await
        .unwrap();

    let verdicts = verdicts.lock().unwrap();
    assert_eq!(verdicts.len(), 3);
    // Undecodable packets fall through to accept, never to silence.
    assert_eq!(verdicts[0], (1, Verdict::Accept));
    assert_eq!(verdicts[1], (2, Verdict::Accept));
    assert_eq!(verdicts[2], (3, Verdict::Accept));
    assert_eq!(session.stats().parse_failures.get(), 2);
}

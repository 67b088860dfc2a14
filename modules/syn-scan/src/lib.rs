//! Half-open TCP scan: inject a hand-built SYN through a raw socket and
//! classify the target's reply from a live capture.

pub mod capture;
pub mod packet;
mod raw;

pub use capture::{classify, find_interface, Capture, CaptureFilter, FrameSource, LinkKind, TcpReply};
pub use packet::{build_ipv4_header, build_syn_packet, build_tcp_syn_header, checksum, tcp_checksum};
pub use pnet::datalink::NetworkInterface;
pub use raw::RawSocket;

use scan_core::ProbeOutcome;
use std::io;
use std::net::{IpAddr, Ipv4Addr, UdpSocket};
use std::time::{Duration, Instant};

/// Longest a single capture read blocks before the deadline is re-checked.
const CAPTURE_POLL: Duration = Duration::from_millis(50);

#[derive(Debug, thiserror::Error)]
pub enum SynError {
    #[error("not an IPv4 address: {0}")]
    InvalidAddress(String),
    #[error("raw socket unavailable (requires CAP_NET_RAW): {0}")]
    RawSocket(#[source] io::Error),
    #[error("sending SYN failed: {0}")]
    Send(#[source] io::Error),
    #[error("interface: {0}")]
    Interface(String),
    #[error("capture failed: {0}")]
    Capture(#[source] io::Error),
}

/// Source address the routing table would use to reach `target`.
///
/// Connecting a UDP socket sends nothing; it only binds a route.
pub fn detect_source_ip(target: Ipv4Addr) -> Result<Ipv4Addr, SynError> {
    let detect = |e: io::Error| SynError::Interface(format!("source address detection: {e}"));
    let sock = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).map_err(detect)?;
    sock.connect((target, 9)).map_err(detect)?;
    packet::ipv4(sock.local_addr().map_err(detect)?.ip())
}

/// Send one SYN from `source_ip:source_port` and wait up to `timeout` for
/// SYN+ACK (open) or RST (closed). No matching reply means filtered.
///
/// The capture is opened before the SYN goes out so a fast reply is not missed.
pub fn probe_tcp(
    iface: &NetworkInterface,
    source_ip: IpAddr,
    dest_ip: IpAddr,
    source_port: u16,
    dest_port: u16,
    timeout: Duration,
) -> Result<ProbeOutcome, SynError> {
    let src = packet::ipv4(source_ip)?;
    let dst = packet::ipv4(dest_ip)?;
    let syn = build_syn_packet(src, dst, source_port, dest_port, rand::random());

    let mut capture = Capture::open(iface, CAPTURE_POLL.min(timeout))?;
    let link = capture.link();
    let filter = CaptureFilter { peer: dst, peer_port: dest_port, local: src, local_port: source_port };

    let started = Instant::now();
    RawSocket::open()?.send_to(&syn, dst)?;
    await_reply(&mut capture, &filter, link, started, started + timeout)
}

/// Read frames until one settles the probe or `deadline` passes.
///
/// Frames outside the filtered flow are dropped without ending the wait.
/// `elapsed` on Open/Closed is measured from `started`.
pub fn await_reply<S: FrameSource>(
    frames: &mut S,
    filter: &CaptureFilter,
    link: LinkKind,
    started: Instant,
    deadline: Instant,
) -> Result<ProbeOutcome, SynError> {
    while Instant::now() < deadline {
        let frame = match frames.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => continue,
            Err(e) => return Err(SynError::Capture(e)),
        };
        let Some(reply) = filter.match_frame(frame, link).and_then(classify) else {
            continue;
        };
        let elapsed = started.elapsed();
        tracing::debug!(port = filter.peer_port, ?reply, ?elapsed, "syn reply");
        return Ok(match reply {
            TcpReply::SynAck => ProbeOutcome::Open { elapsed },
            TcpReply::Rst => ProbeOutcome::Closed { elapsed },
        });
    }
    tracing::debug!(port = filter.peer_port, "no syn reply before timeout");
    Ok(ProbeOutcome::Filtered)
}

/// The fixed half of a SYN probe: where we send from and where we listen.
#[derive(Debug, Clone)]
pub struct SynProbe {
    pub source_ip: Ipv4Addr,
    pub source_port: u16,
    pub interface: NetworkInterface,
}

impl SynProbe {
    /// Resolve the source address for `target` and the capture interface.
    pub fn for_target(target: Ipv4Addr, interface: Option<&str>, source_port: u16) -> Result<Self, SynError> {
        let source_ip = detect_source_ip(target)?;
        let interface = find_interface(interface, source_ip)?;
        tracing::info!(%source_ip, source_port, interface = %interface.name, "syn probe ready");
        Ok(SynProbe { source_ip, source_port, interface })
    }

    pub fn probe(&self, dest: Ipv4Addr, port: u16, timeout: Duration) -> Result<ProbeOutcome, SynError> {
        probe_tcp(
            &self.interface,
            IpAddr::V4(self.source_ip),
            IpAddr::V4(dest),
            self.source_port,
            port,
            timeout,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::net::TcpListener;

    #[test]
    fn loopback_routes_from_loopback() {
        assert_eq!(detect_source_ip(Ipv4Addr::LOCALHOST).unwrap(), Ipv4Addr::LOCALHOST);
    }

    #[test]
    fn v6_source_is_rejected_before_any_io() {
        let Some(iface) = pnet::datalink::interfaces().into_iter().next() else {
            return;
        };
        let err = probe_tcp(
            &iface,
            "::1".parse().unwrap(),
            IpAddr::V4(Ipv4Addr::LOCALHOST),
            40000,
            80,
            Duration::from_millis(10),
        )
        .unwrap_err();
        assert!(matches!(err, SynError::InvalidAddress(_)));
    }

    #[test]
    fn unknown_interface_name_is_an_error() {
        let err = find_interface(Some("no-such-if0"), Ipv4Addr::LOCALHOST).unwrap_err();
        assert!(matches!(err, SynError::Interface(_)));
    }

    const PEER: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 2);
    const US: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);

    /// Replays queued frames, then reports an idle poll until drained.
    struct Replay {
        queue: VecDeque<io::Result<Vec<u8>>>,
        current: Vec<u8>,
        polls: usize,
    }

    impl Replay {
        fn new(frames: Vec<io::Result<Vec<u8>>>) -> Self {
            Replay { queue: frames.into(), current: Vec::new(), polls: 0 }
        }
    }

    impl FrameSource for Replay {
        fn next_frame(&mut self) -> io::Result<Option<&[u8]>> {
            self.polls += 1;
            match self.queue.pop_front() {
                Some(Ok(frame)) => {
                    self.current = frame;
                    Ok(Some(&self.current))
                }
                Some(Err(e)) => Err(e),
                None => {
                    std::thread::sleep(Duration::from_millis(1));
                    Ok(None)
                }
            }
        }
    }

    /// Bare IPv4+TCP reply from `PEER:src_port` to `US:dst_port`.
    fn segment(src_port: u16, dst_port: u16, flags: u8) -> Vec<u8> {
        let mut p = build_syn_packet(PEER, US, src_port, dst_port, 1).to_vec();
        p[33] = flags;
        p
    }

    fn wait_on(frames: &mut Replay, window: Duration) -> Result<ProbeOutcome, SynError> {
        let filter = CaptureFilter { peer: PEER, peer_port: 80, local: US, local_port: 40000 };
        let started = Instant::now();
        await_reply(frames, &filter, LinkKind::RawIp, started, started + window)
    }

    #[test]
    fn silence_until_deadline_is_filtered() {
        let mut frames = Replay::new(vec![]);
        let started = Instant::now();
        let outcome = wait_on(&mut frames, Duration::from_millis(30)).unwrap();
        assert_eq!(outcome, ProbeOutcome::Filtered);
        assert!(started.elapsed() >= Duration::from_millis(30));
        assert!(frames.polls > 1);
    }

    #[test]
    fn unrelated_frames_do_not_end_the_wait() {
        let mut frames = Replay::new(vec![
            Ok(segment(81, 40000, 0x12)),
            Ok(vec![0u8; 8]),
            Ok(segment(80, 40001, 0x14)),
            Ok(segment(80, 40000, 0x02)),
            Ok(segment(80, 40000, 0x12)),
        ]);
        let outcome = wait_on(&mut frames, Duration::from_secs(5)).unwrap();
        assert!(outcome.is_open(), "{outcome}");
        assert_eq!(frames.polls, 5);
    }

    #[test]
    fn rst_on_the_probed_flow_is_closed() {
        let mut frames = Replay::new(vec![Ok(segment(443, 40000, 0x12)), Ok(segment(80, 40000, 0x14))]);
        let outcome = wait_on(&mut frames, Duration::from_secs(5)).unwrap();
        assert!(matches!(outcome, ProbeOutcome::Closed { .. }), "{outcome}");
    }

    #[test]
    fn capture_errors_are_surfaced() {
        let mut frames = Replay::new(vec![
            Ok(segment(81, 40000, 0x12)),
            Err(io::Error::new(io::ErrorKind::Other, "interface went down")),
        ]);
        let err = wait_on(&mut frames, Duration::from_secs(5)).unwrap_err();
        assert!(matches!(err, SynError::Capture(_)));
    }

    fn loopback_probe(port: u16) -> SynProbe {
        SynProbe::for_target(Ipv4Addr::LOCALHOST, Some("lo"), port).unwrap()
    }

    #[test]
    #[ignore = "needs CAP_NET_RAW and a capturable loopback"]
    fn open_port_answers_syn_ack() {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let port = listener.local_addr().unwrap().port();
        let outcome = loopback_probe(40001).probe(Ipv4Addr::LOCALHOST, port, Duration::from_secs(2)).unwrap();
        assert!(outcome.is_open(), "{outcome}");
    }

    #[test]
    #[ignore = "needs CAP_NET_RAW and a capturable loopback"]
    fn closed_port_answers_rst() {
        let port = {
            let l = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
            l.local_addr().unwrap().port()
        };
        let outcome = loopback_probe(40002).probe(Ipv4Addr::LOCALHOST, port, Duration::from_secs(2)).unwrap();
        assert!(matches!(outcome, ProbeOutcome::Closed { .. }), "{outcome}");
    }
}

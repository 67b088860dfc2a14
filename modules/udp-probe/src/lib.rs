//! UDP port check plus the Echo and DNS service probes.

use anyhow::Result;
use dns_wire::{Message, Name, RecordType};
use scan_core::ProbeOutcome;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::time::timeout;

pub const ECHO_MESSAGE: &[u8] = b"Echo test message";

const DNS_PROBE_ID: u16 = 0x9bce;
const DNS_PROBE_NAME: &str = "habrahabr.ru";

/// Socket connected to `ip:port`, so ICMP errors come back on `recv`.
async fn connected(ip: IpAddr, port: u16) -> Result<UdpSocket> {
    let local: SocketAddr = match ip {
        IpAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
        IpAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
    };
    let sock = UdpSocket::bind(local).await?;
    sock.connect((ip, port)).await?;
    Ok(sock)
}

/// Send an empty datagram and watch what comes back.
///
/// A reply means open. Silence until `wait` is also reported open, since an
/// open service may simply ignore an empty datagram (open|filtered). Only an
/// ICMP port-unreachable, surfaced as connection refused, means closed.
pub async fn scan_udp(ip: IpAddr, port: u16, wait: Duration) -> Result<ProbeOutcome> {
    let sock = connected(ip, port).await?;
    let started = Instant::now();
    sock.send(&[]).await?;

    let mut buf = [0u8; 1024];
    let outcome = match timeout(wait, sock.recv(&mut buf)).await {
        Err(_) => ProbeOutcome::Open { elapsed: started.elapsed() },
        Ok(Ok(_)) => ProbeOutcome::Open { elapsed: started.elapsed() },
        Ok(Err(e)) if e.kind() == io::ErrorKind::ConnectionRefused => {
            ProbeOutcome::Closed { elapsed: started.elapsed() }
        }
        Ok(Err(e)) => return Err(e.into()),
    };
    tracing::debug!(port, %outcome, "udp probe");
    Ok(outcome)
}

/// True when the port sends back exactly what it was sent.
pub async fn probe_echo(ip: IpAddr, port: u16, wait: Duration) -> Result<bool> {
    let sock = connected(ip, port).await?;
    timeout(wait, sock.send(ECHO_MESSAGE)).await??;
    let mut buf = [0u8; 1024];
    let n = timeout(wait, sock.recv(&mut buf)).await??;
    Ok(&buf[..n] == ECHO_MESSAGE)
}

/// The fixed A query the DNS probe sends.
pub fn dns_probe_query() -> Result<Vec<u8>> {
    let name: Name = DNS_PROBE_NAME.parse()?;
    Ok(Message::query(DNS_PROBE_ID, name, RecordType::A).encode())
}

/// True when the reply to [`dns_probe_query`] decodes as a DNS message.
pub async fn probe_dns(ip: IpAddr, port: u16, wait: Duration) -> Result<bool> {
    let sock = connected(ip, port).await?;
    timeout(wait, sock.send(&dns_probe_query()?)).await??;
    let mut buf = [0u8; 1024];
    let n = timeout(wait, sock.recv(&mut buf)).await??;
    let reply = dns_wire::parse_response(&buf[..n])?;
    tracing::debug!(port, answers = reply.answers.len(), skipped = reply.skipped.len(), "dns reply");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dns_wire::{RecordData, ResourceRecord};

    const LO: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);
    const WAIT: Duration = Duration::from_millis(300);

    /// UDP server answering each datagram with `reply(datagram)`, if any.
    async fn serve<F>(reply: F) -> u16
    where
        F: Fn(&[u8]) -> Option<Vec<u8>> + Send + 'static,
    {
        let sock = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let port = sock.local_addr().unwrap().port();
        tokio::spawn(async move {
            let mut buf = [0u8; 1500];
            while let Ok((n, peer)) = sock.recv_from(&mut buf).await {
                if let Some(out) = reply(&buf[..n]) {
                    let _ = sock.send_to(&out, peer).await;
                }
            }
        });
        port
    }

    async fn unused_port() -> u16 {
        let s = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        s.local_addr().unwrap().port()
    }

    #[test]
    fn probe_query_is_a_standard_a_query() {
        let q = dns_probe_query().unwrap();
        assert_eq!(&q[..2], &[0x9b, 0xce]);
        let m = dns_wire::parse_request(&q).unwrap();
        assert!(m.header.rd);
        let question = m.question().unwrap();
        assert_eq!(question.name.to_string(), "habrahabr.ru");
        assert_eq!(question.qtype, RecordType::A.code());
    }

    #[tokio::test]
    async fn udp_reply_means_open() {
        let port = serve(|_| Some(b"hi".to_vec())).await;
        assert!(scan_udp(LO, port, WAIT).await.unwrap().is_open());
    }

    #[tokio::test]
    async fn udp_silence_is_reported_open() {
        let port = serve(|_| None).await;
        assert!(scan_udp(LO, port, WAIT).await.unwrap().is_open());
    }

    #[tokio::test]
    async fn udp_unreachable_means_closed() {
        let port = unused_port().await;
        let outcome = scan_udp(LO, port, WAIT).await.unwrap();
        assert!(matches!(outcome, ProbeOutcome::Closed { .. }), "{outcome}");
    }

    #[tokio::test]
    async fn echo_requires_identical_bytes() {
        let echo = serve(|d| Some(d.to_vec())).await;
        assert!(probe_echo(LO, echo, WAIT).await.unwrap());

        let longer = serve(|d| Some([d, &b"!"[..]].concat())).await;
        assert!(!probe_echo(LO, longer, WAIT).await.unwrap());

        let silent = serve(|_| None).await;
        assert!(probe_echo(LO, silent, WAIT).await.is_err());
    }

    #[tokio::test]
    async fn dns_probe_accepts_decodable_reply() {
        let port = serve(|d| {
            let mut m = dns_wire::parse_request(d).ok()?;
            m.header.qr = true;
            let owner = m.question()?.name.clone();
            m.push_answer(ResourceRecord::new(owner, 60, RecordData::A(Ipv4Addr::new(1, 2, 3, 4))));
            Some(m.encode())
        })
        .await;
        assert!(probe_dns(LO, port, WAIT).await.unwrap());
    }

    #[tokio::test]
    async fn dns_probe_rejects_garbage() {
        let port = serve(|_| Some(b"nope".to_vec())).await;
        assert!(probe_dns(LO, port, WAIT).await.is_err());
    }
}

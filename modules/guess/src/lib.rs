//! Best-effort identification of the protocol behind an open port.

use anyhow::Result;
use std::net::IpAddr;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Service conventionally bound to `port`.
pub fn well_known(port: u16) -> Option<&'static str> {
    let name = match port {
        20 | 21 => "FTP",
        22 => "SSH",
        23 => "Telnet",
        25 => "SMTP",
        53 => "DNS",
        69 => "TFTP",
        80 => "HTTP",
        88 => "Kerberos",
        110 => "POP3",
        123 => "NTP",
        143 => "IMAP",
        161 => "SNMP",
        179 => "BGP",
        389 => "LDAP",
        443 => "HTTPS",
        445 => "SMB",
        636 => "LDAPS",
        3306 => "MySQL",
        3389 => "RDP",
        5432 => "PostgreSQL",
        _ => return None,
    };
    Some(name)
}

/// Send `HEAD /` and check whether the first line looks like an HTTP status line.
pub async fn probe_http(ip: IpAddr, port: u16, wait: Duration) -> Result<bool> {
    let mut stream = timeout(wait, TcpStream::connect((ip, port))).await??;
    timeout(wait, stream.write_all(b"HEAD / HTTP/1.0\r\n\r\n")).await??;
    let mut line = String::new();
    let mut reader = BufReader::new(stream);
    timeout(wait, reader.read_line(&mut line)).await??;
    Ok(line.contains("HTTP/"))
}

/// Try, in order, the port table, HTTP, Echo and DNS; first hit wins.
///
/// Probe failures only mean "not this protocol" and never propagate.
pub async fn guess_protocol(ip: IpAddr, port: u16, wait: Duration) -> Option<String> {
    if let Some(name) = well_known(port) {
        return Some(name.to_string());
    }
    if hit("http", port, probe_http(ip, port, wait).await) {
        return Some("HTTP".into());
    }
    if hit("echo", port, udp_probe::probe_echo(ip, port, wait).await) {
        return Some("ECHO".into());
    }
    if hit("dns", port, udp_probe::probe_dns(ip, port, wait).await) {
        return Some("DNS".into());
    }
    None
}

fn hit(probe: &str, port: u16, result: Result<bool>) -> bool {
    match result {
        Ok(found) => found,
        Err(e) => {
            tracing::debug!(probe, port, error = %e, "guess probe failed");
            false
        }
    }
}

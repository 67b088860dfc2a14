//! Core types shared by the scanner crates: jobs, results and probe outcomes.

pub mod config;

pub use config::{ConfigError, ScannerConfig};

use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub const fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Transport a port is scanned over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tcp" => Ok(Protocol::Tcp),
            "udp" => Ok(Protocol::Udp),
            other => Err(ConfigError::UnknownProtocol(other.to_string())),
        }
    }
}

/// Inclusive port range tagged with the transport to scan it over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRange {
    pub protocol: Protocol,
    pub start: u16,
    pub end: u16,
}

impl PortRange {
    pub fn new(protocol: Protocol, start: u16, end: u16) -> Self {
        PortRange { protocol, start, end }
    }

    pub fn single(protocol: Protocol, port: u16) -> Self {
        PortRange::new(protocol, port, port)
    }

    /// Number of ports covered; zero for an inverted range.
    pub fn len(&self) -> usize {
        if self.start > self.end {
            0
        } else {
            (self.end - self.start) as usize + 1
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ports(&self) -> impl Iterator<Item = u16> {
        self.start..=self.end
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}/{}", self.protocol, self.start)
        } else {
            write!(f, "{}/{}-{}", self.protocol, self.start, self.end)
        }
    }
}

/// One unit of work: a single port over a single transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScanJob {
    pub protocol: Protocol,
    pub port: u16,
}

/// What a transport engine concluded about one port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    Open { elapsed: Duration },
    Closed { elapsed: Duration },
    /// No answer before the timeout.
    Filtered,
}

impl ProbeOutcome {
    pub fn is_open(&self) -> bool {
        matches!(self, ProbeOutcome::Open { .. })
    }

    pub fn elapsed(&self) -> Option<Duration> {
        match self {
            ProbeOutcome::Open { elapsed } | ProbeOutcome::Closed { elapsed } => Some(*elapsed),
            ProbeOutcome::Filtered => None,
        }
    }
}

impl fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeOutcome::Open { .. } => f.write_str("open"),
            ProbeOutcome::Closed { .. } => f.write_str("closed"),
            ProbeOutcome::Filtered => f.write_str("filtered"),
        }
    }
}

/// A confirmed-open port, handed to the caller's sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanResult {
    pub protocol: Protocol,
    pub port: u16,
    #[serde(rename = "elapsed_ms", serialize_with = "duration_as_millis")]
    pub elapsed: Duration,
    pub guessed_service: Option<String>,
}

fn duration_as_millis<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_set() {
        assert!(!version().is_empty());
    }

    #[test]
    fn protocol_parses_case_insensitively() {
        assert_eq!("TCP".parse::<Protocol>().unwrap(), Protocol::Tcp);
        assert_eq!(" udp".parse::<Protocol>().unwrap(), Protocol::Udp);
        assert!("sctp".parse::<Protocol>().is_err());
    }

    #[test]
    fn range_len_and_display() {
        let r = PortRange::new(Protocol::Tcp, 20, 25);
        assert_eq!(r.len(), 6);
        assert_eq!(r.ports().collect::<Vec<_>>(), vec![20, 21, 22, 23, 24, 25]);
        assert_eq!(r.to_string(), "tcp/20-25");
        assert_eq!(PortRange::single(Protocol::Udp, 53).to_string(), "udp/53");
        assert!(PortRange::new(Protocol::Tcp, 9, 1).is_empty());
    }

    #[test]
    fn only_open_reports_open() {
        let d = Duration::from_millis(3);
        assert!(ProbeOutcome::Open { elapsed: d }.is_open());
        assert!(!ProbeOutcome::Closed { elapsed: d }.is_open());
        assert_eq!(ProbeOutcome::Filtered.elapsed(), None);
    }

    #[test]
    fn result_serializes_elapsed_in_millis() {
        let r = ScanResult {
            protocol: Protocol::Tcp,
            port: 80,
            elapsed: Duration::from_millis(1500),
            guessed_service: Some("HTTP".into()),
        };
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["elapsed_ms"], 1500);
        assert_eq!(v["protocol"], "tcp");
        assert_eq!(v["guessed_service"], "HTTP");
    }
}

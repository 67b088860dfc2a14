use crate::{PortRange, Protocol};
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

/// Upper bound on the worker pool size.
pub const MAX_WORKERS: usize = 100;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);
pub const DEFAULT_SOURCE_PORT: u16 = 40000;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown protocol: {0}")]
    UnknownProtocol(String),
    #[error("invalid port range: {0}")]
    InvalidRange(String),
    #[error("no ports to scan")]
    NoPorts,
    #[error("timeout must be greater than zero")]
    ZeroTimeout,
    #[error("only IPv4 targets are supported, got {0}")]
    NotIpv4(IpAddr),
}

/// Immutable scan settings, shared read-only by every worker.
#[derive(Debug, Clone)]
pub struct ScannerConfig {
    pub ip: IpAddr,
    pub port_ranges: Vec<PortRange>,
    pub timeout: Duration,
    /// 0 runs the scan serially on the calling task.
    pub worker_count: usize,
    pub verbose: bool,
    pub guess: bool,
    /// Capture interface for SYN replies; resolved from the source address when unset.
    pub interface: Option<String>,
    pub source_port: u16,
}

impl ScannerConfig {
    pub fn new(ip: IpAddr, port_ranges: Vec<PortRange>) -> Self {
        ScannerConfig {
            ip,
            port_ranges,
            timeout: DEFAULT_TIMEOUT,
            worker_count: 1,
            verbose: false,
            guess: false,
            interface: None,
            source_port: DEFAULT_SOURCE_PORT,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.worker_count = workers.min(MAX_WORKERS);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_guess(mut self, guess: bool) -> Self {
        self.guess = guess;
        self
    }

    pub fn ipv4(&self) -> Result<Ipv4Addr, ConfigError> {
        match self.ip {
            IpAddr::V4(v4) => Ok(v4),
            other => Err(ConfigError::NotIpv4(other)),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.ipv4()?;
        if self.timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.port_ranges.is_empty() {
            return Err(ConfigError::NoPorts);
        }
        for r in &self.port_ranges {
            if r.start == 0 || r.is_empty() {
                return Err(ConfigError::InvalidRange(r.to_string()));
            }
        }
        Ok(())
    }

    pub fn has_protocol(&self, protocol: Protocol) -> bool {
        self.port_ranges.iter().any(|r| r.protocol == protocol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv6Addr;

    fn localhost(ranges: Vec<PortRange>) -> ScannerConfig {
        ScannerConfig::new(IpAddr::V4(Ipv4Addr::LOCALHOST), ranges)
    }

    #[test]
    fn workers_are_clamped() {
        let cfg = localhost(vec![PortRange::single(Protocol::Tcp, 80)]).with_workers(500);
        assert_eq!(cfg.worker_count, MAX_WORKERS);
    }

    #[test]
    fn detects_configured_protocols() {
        let cfg = localhost(vec![
            PortRange::new(Protocol::Tcp, 1, 10),
            PortRange::new(Protocol::Udp, 5, 6),
        ]);
        assert!(cfg.has_protocol(Protocol::Udp));
        assert!(!localhost(vec![PortRange::single(Protocol::Tcp, 80)]).has_protocol(Protocol::Udp));
    }

    #[test]
    fn validate_rejects_bad_input() {
        assert_eq!(localhost(vec![]).validate(), Err(ConfigError::NoPorts));
        assert!(matches!(
            localhost(vec![PortRange::new(Protocol::Tcp, 10, 5)]).validate(),
            Err(ConfigError::InvalidRange(_))
        ));
        assert!(matches!(
            localhost(vec![PortRange::single(Protocol::Tcp, 0)]).validate(),
            Err(ConfigError::InvalidRange(_))
        ));
        let zero = localhost(vec![PortRange::single(Protocol::Tcp, 80)]).with_timeout(Duration::ZERO);
        assert_eq!(zero.validate(), Err(ConfigError::ZeroTimeout));
        let v6 = ScannerConfig::new(IpAddr::V6(Ipv6Addr::LOCALHOST), vec![PortRange::single(Protocol::Tcp, 80)]);
        assert!(matches!(v6.validate(), Err(ConfigError::NotIpv4(_))));
    }

    #[test]
    fn validate_accepts_defaults() {
        let cfg = localhost(vec![PortRange::new(Protocol::Tcp, 1, 1024)]);
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.timeout, DEFAULT_TIMEOUT);
    }
}

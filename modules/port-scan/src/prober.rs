use crate::ScanError;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use scan_core::{ProbeOutcome, Protocol, ScanJob, ScannerConfig};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;
use syn_scan::SynProbe;

/// What the orchestrator needs from the network: classify a port, and name
/// the service on an open one.
#[async_trait]
pub trait PortProber: Send + Sync {
    async fn probe(&self, job: ScanJob) -> Result<ProbeOutcome>;

    async fn guess(&self, port: u16) -> Option<String>;
}

/// Raw SYN probes for TCP, datagram probes for UDP.
pub struct NetworkProber {
    target: Ipv4Addr,
    timeout: Duration,
    syn: Option<Arc<SynProbe>>,
}

impl NetworkProber {
    /// Resolve the SYN source address and capture interface up front when
    /// any TCP range is configured, so a missing interface fails the scan once.
    pub fn from_config(config: &ScannerConfig) -> Result<Self, ScanError> {
        let target = config.ipv4()?;
        let syn = if config.has_protocol(Protocol::Tcp) {
            let probe = SynProbe::for_target(target, config.interface.as_deref(), config.source_port)?;
            Some(Arc::new(probe))
        } else {
            None
        };
        Ok(NetworkProber { target, timeout: config.timeout, syn })
    }
}

#[async_trait]
impl PortProber for NetworkProber {
    async fn probe(&self, job: ScanJob) -> Result<ProbeOutcome> {
        match job.protocol {
            Protocol::Tcp => {
                let syn = self.syn.clone().ok_or_else(|| anyhow!("no SYN prober configured"))?;
                let (target, timeout) = (self.target, self.timeout);
                // raw socket and capture calls block
                let outcome =
                    tokio::task::spawn_blocking(move || syn.probe(target, job.port, timeout)).await??;
                Ok(outcome)
            }
            Protocol::Udp => udp_probe::scan_udp(IpAddr::V4(self.target), job.port, self.timeout).await,
        }
    }

    async fn guess(&self, port: u16) -> Option<String> {
        guess::guess_protocol(IpAddr::V4(self.target), port, self.timeout).await
    }
}

//! Port-spec parsing and the scan orchestrator: jobs fan out to a pool of
//! workers and open ports fan back in to the caller's sink.

mod prober;

pub use prober::{NetworkProber, PortProber};

use scan_core::{ConfigError, PortRange, Protocol, ScanJob, ScanResult, ScannerConfig};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Syn(#[from] syn_scan::SynError),
    #[error("{protocol}/{port}: {source}")]
    Probe {
        protocol: Protocol,
        port: u16,
        #[source]
        source: anyhow::Error,
    },
}

/// Parse one `proto/list` argument such as `tcp/22,80,8000-8100`.
/// Each comma element becomes its own range.
pub fn parse_port_spec(spec: &str) -> Result<Vec<PortRange>, ConfigError> {
    let (proto, list) = spec
        .split_once('/')
        .ok_or_else(|| ConfigError::InvalidRange(format!("{spec} (expected proto/ports)")))?;
    let protocol: Protocol = proto.parse()?;

    let mut ranges = Vec::new();
    for part in list.split(',').map(|s| s.trim()).filter(|s| !s.is_empty()) {
        let invalid = || ConfigError::InvalidRange(format!("{protocol}/{part}"));
        let (s, e) = part.split_once('-').unwrap_or((part, part));
        let start: u16 = s.trim().parse().map_err(|_| invalid())?;
        let end: u16 = e.trim().parse().map_err(|_| invalid())?;
        if start == 0 || start > end {
            return Err(invalid());
        }
        ranges.push(PortRange::new(protocol, start, end));
    }
    if ranges.is_empty() {
        return Err(ConfigError::NoPorts);
    }
    Ok(ranges)
}

/// Expand ranges into jobs, each port once. When ranges overlap the first
/// range to name a port decides its protocol.
pub fn expand_jobs(ranges: &[PortRange]) -> Vec<ScanJob> {
    let mut seen = HashSet::new();
    ranges
        .iter()
        .flat_map(|r| r.ports().map(move |port| ScanJob { protocol: r.protocol, port }))
        .filter(|job| seen.insert(job.port))
        .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub jobs: usize,
    pub open: usize,
}

/// Scan every configured port and hand each open one to `sink`.
///
/// With `worker_count == 0` jobs run one after another on the calling task.
/// Otherwise that many workers share one job queue; a supervisor joins them
/// and then closes the result queue so draining it ends. A port whose probe
/// fails is logged and skipped.
pub async fn scan_ports<P, F>(
    config: Arc<ScannerConfig>,
    prober: Arc<P>,
    mut sink: F,
) -> Result<ScanSummary, ScanError>
where
    P: PortProber + 'static,
    F: FnMut(ScanResult),
{
    config.validate()?;
    let jobs = expand_jobs(&config.port_ranges);
    let mut summary = ScanSummary { jobs: jobs.len(), open: 0 };
    tracing::info!(target_ip = %config.ip, jobs = jobs.len(), workers = config.worker_count, "scan started");

    if config.worker_count == 0 {
        for job in jobs {
            if let Some(result) = run_job(prober.as_ref(), &config, job).await {
                summary.open += 1;
                sink(result);
            }
        }
        tracing::info!(open = summary.open, "scan finished");
        return Ok(summary);
    }

    let capacity = jobs.len().max(1);
    let (job_tx, job_rx) = async_channel::bounded::<ScanJob>(capacity);
    let (result_tx, mut result_rx) = mpsc::channel::<ScanResult>(capacity);

    tokio::spawn(async move {
        for job in jobs {
            if job_tx.send(job).await.is_err() {
                break;
            }
        }
        // job_tx drops here, closing the queue
    });

    let workers: Vec<JoinHandle<()>> = (0..config.worker_count)
        .map(|id| {
            let jobs = job_rx.clone();
            let results = result_tx.clone();
            let prober = Arc::clone(&prober);
            let config = Arc::clone(&config);
            tokio::spawn(async move {
                while let Ok(job) = jobs.recv().await {
                    if let Some(result) = run_job(prober.as_ref(), &config, job).await {
                        if results.send(result).await.is_err() {
                            break;
                        }
                    }
                }
                tracing::debug!(worker = id, "worker done");
            })
        })
        .collect();
    drop(job_rx);

    tokio::spawn(async move {
        for w in workers {
            if let Err(e) = w.await {
                tracing::warn!(error = %e, "worker aborted");
            }
        }
        drop(result_tx);
    });

    while let Some(result) = result_rx.recv().await {
        summary.open += 1;
        sink(result);
    }
    tracing::info!(open = summary.open, "scan finished");
    Ok(summary)
}

async fn run_job<P: PortProber + ?Sized>(
    prober: &P,
    config: &ScannerConfig,
    job: ScanJob,
) -> Option<ScanResult> {
    let outcome = match prober.probe(job).await {
        Ok(outcome) => outcome,
        Err(source) => {
            let err = ScanError::Probe { protocol: job.protocol, port: job.port, source };
            tracing::warn!(error = %err, "port skipped");
            return None;
        }
    };
    tracing::debug!(protocol = %job.protocol, port = job.port, %outcome, "probed");
    if !outcome.is_open() {
        return None;
    }

    let guessed_service = if config.guess { prober.guess(job.port).await } else { None };
    Some(ScanResult {
        protocol: job.protocol,
        port: job.port,
        elapsed: outcome.elapsed().unwrap_or_default(),
        guessed_service,
    })
}

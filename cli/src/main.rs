use anyhow::{anyhow, Result};
use clap::Parser;
use scan_core::config::MAX_WORKERS;
use scan_core::{PortRange, ScannerConfig};
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

mod config;
mod output;

use output::{Output, OutputFormat};

const DEFAULT_TIMEOUT_SECS: u64 = 2;

#[derive(Debug, Parser)]
#[command(name = "portscan", version = scan_core::version(), about = "TCP SYN and UDP port scanner")]
struct Cli {
    /// Target IPv4 address
    ip: IpAddr,
    /// Ports to scan, e.g. tcp/80,443,1000-1100 udp/53
    #[arg(required = true, value_name = "PROTO/PORTS")]
    ports: Vec<String>,
    /// Response timeout in seconds [default: 2]
    #[arg(long)]
    timeout: Option<u64>,
    /// Worker threads, clamped to 0..=100; 0 scans serially [default: 1]
    #[arg(short = 'j', long = "num-threads", allow_negative_numbers = true)]
    num_threads: Option<i64>,
    /// Print the response time of each open port
    #[arg(short, long)]
    verbose: bool,
    /// Guess the application protocol of each open port
    #[arg(short, long)]
    guess: bool,
    /// Capture interface for SYN replies (default: the one owning the source address)
    #[arg(long)]
    interface: Option<String>,
    /// Source port for SYN probes [default: 40000]
    #[arg(long)]
    source_port: Option<u16>,
    /// Output format
    #[arg(long, value_enum)]
    format: Option<OutputFormat>,
    /// Output file (overwrites)
    #[arg(long, value_name = "FILE")]
    out: Option<PathBuf>,
    /// Write CSV rows to --out instead of text/json
    #[arg(long, default_value_t = false)]
    csv: bool,
    /// Optional config file (YAML). If omitted, loads ./portscan.yaml if present.
    #[arg(long)]
    config: Option<PathBuf>,
}

struct Settings {
    config: ScannerConfig,
    format: OutputFormat,
}

fn clamp_workers(n: i64) -> usize {
    n.clamp(0, MAX_WORKERS as i64) as usize
}

/// Command line first, then the config file, then built-in defaults.
fn resolve(cli: &Cli, file: Option<config::FileConfig>) -> Result<Settings> {
    let file = file.unwrap_or_default();

    let mut ranges: Vec<PortRange> = Vec::new();
    for spec in &cli.ports {
        ranges.extend(port_scan::parse_port_spec(spec)?);
    }

    let format = match (cli.format, file.format.as_deref()) {
        (Some(f), _) => f,
        (None, Some(name)) => OutputFormat::from_name(name).ok_or_else(|| anyhow!("unknown format in config: {name}"))?,
        (None, None) => OutputFormat::Text,
    };

    let mut config = ScannerConfig::new(cli.ip, ranges)
        .with_timeout(Duration::from_secs(cli.timeout.or(file.timeout).unwrap_or(DEFAULT_TIMEOUT_SECS)))
        .with_workers(clamp_workers(cli.num_threads.or(file.num_threads).unwrap_or(1)))
        .with_guess(cli.guess || file.guess.unwrap_or(false));
    config.verbose = cli.verbose || file.verbose.unwrap_or(false);
    config.interface = cli.interface.clone().or(file.interface);
    if let Some(port) = cli.source_port.or(file.source_port) {
        config.source_port = port;
    }
    config.validate()?;
    Ok(Settings { config, format })
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let file = config::load_config(cli.config.as_deref())?;
    let Settings { config, format } = resolve(&cli, file)?;
    init_tracing(config.verbose);

    let mut output = Output::new(
        config.ip.to_string(),
        format,
        config.verbose,
        config.guess,
        cli.out.as_deref(),
        cli.csv,
    )?;

    let config = Arc::new(config);
    let prober = Arc::new(port_scan::NetworkProber::from_config(&config)?);
    let rt = tokio::runtime::Runtime::new()?;

    let start = Instant::now();
    let mut write_err = None;
    let summary = rt.block_on(port_scan::scan_ports(Arc::clone(&config), prober, |r| {
        if write_err.is_none() {
            write_err = output.emit(r).err();
        }
    }))?;
    if let Some(e) = write_err {
        return Err(e);
    }
    output.finish(summary.jobs)?;
    tracing::info!(
        scanned = summary.jobs,
        open = summary.open,
        duration_ms = start.elapsed().as_millis() as u64,
        "done"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileConfig;
    use scan_core::Protocol;

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("portscan").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn threads_are_clamped() {
        assert_eq!(clamp_workers(-3), 0);
        assert_eq!(clamp_workers(8), 8);
        assert_eq!(clamp_workers(1000), 100);
    }

    #[test]
    fn parses_positional_ip_and_port_specs() {
        let c = cli(&["-j", "8", "-v", "10.0.0.1", "tcp/22,80-81", "udp/53"]);
        let s = resolve(&c, None).unwrap();
        assert_eq!(s.config.worker_count, 8);
        assert!(s.config.verbose);
        assert!(!s.config.guess);
        assert_eq!(s.config.timeout, Duration::from_secs(2));
        assert_eq!(s.config.source_port, 40000);
        assert_eq!(s.config.port_ranges.len(), 3);
        assert_eq!(s.config.port_ranges[2], PortRange::single(Protocol::Udp, 53));
        assert_eq!(s.format, OutputFormat::Text);
    }

    #[test]
    fn negative_thread_count_means_serial() {
        let c = cli(&["-j", "-1", "10.0.0.1", "tcp/80"]);
        assert_eq!(resolve(&c, None).unwrap().config.worker_count, 0);
    }

    #[test]
    fn command_line_beats_file_beats_default() {
        let file = FileConfig {
            timeout: Some(5),
            num_threads: Some(32),
            source_port: Some(41000),
            format: Some("jsonl".into()),
            ..FileConfig::default()
        };
        let c = cli(&["--timeout", "1", "10.0.0.1", "tcp/80"]);
        let s = resolve(&c, Some(file)).unwrap();
        assert_eq!(s.config.timeout, Duration::from_secs(1));
        assert_eq!(s.config.worker_count, 32);
        assert_eq!(s.config.source_port, 41000);
        assert_eq!(s.format, OutputFormat::Jsonl);
    }

    #[test]
    fn bad_input_is_rejected() {
        assert!(resolve(&cli(&["10.0.0.1", "tcp/0"]), None).is_err());
        assert!(resolve(&cli(&["::1", "tcp/80"]), None).is_err());
        assert!(resolve(&cli(&["--timeout", "0", "10.0.0.1", "tcp/80"]), None).is_err());
        assert!(Cli::try_parse_from(["portscan", "10.0.0.1"]).is_err());
    }
}

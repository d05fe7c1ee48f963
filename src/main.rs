//! Scanner CLI: discover open ports, fingerprint services, and stream
//! NDJSON `Service` records to stdout.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use futures::future::BoxFuture;
use log::{info, warn};
use tokio_util::sync::CancellationToken;

use hostscan::config::{LogFormat, LogLevel};
use hostscan::discovery::{connect::ConnectDiscoverer, expand_targets, DiscoveryConfig, ScanType};
use hostscan::error_handling::ScanError;
use hostscan::fingerprint::{FingerprintConfig, FingerprintEngine};
use hostscan::initialization::{init_crypto_provider, init_logger_with};
use hostscan::messaging::ndjson::NdjsonProducer;
use hostscan::messaging::Producer;
use hostscan::models::Service;
use hostscan::plugins::PluginRegistry;
use hostscan::scan::{scan_with_discovery_stream, OnEvent};

#[derive(Parser, Debug)]
#[command(
    name = "hostscan",
    about = "Scan IPv4 targets for open ports and identify the services behind them",
    after_help = "TARGET SPECIFICATION:\n    One or more IPv4 addresses or CIDR ranges\nEXAMPLES:\n    hostscan 192.168.1.0/24 10.0.0.1/32\n    hostscan --ports 22,80,443 198.51.100.7"
)]
struct Opt {
    /// IPv4 addresses or CIDR ranges; comma- or space-separated within an
    /// argument
    #[arg(required = true)]
    targets: Vec<String>,

    /// Fast mode: probe only plugins hinted at the discovered port
    #[arg(short, long)]
    fast: bool,

    /// Run UDP plugins (may require elevated privileges)
    #[arg(short = 'U', long)]
    udp: bool,

    /// Verbose probe logging
    #[arg(short, long)]
    verbose: bool,

    /// Probe timeout in milliseconds
    #[arg(short = 'w', long, default_value_t = 1000)]
    timeout: u64,

    /// Discovery scan type (c=connect, s=syn)
    #[arg(long, default_value = "c")]
    scan_type: String,

    /// Explicit ports list (e.g. 80,443); overrides top ports
    #[arg(long)]
    ports: Option<String>,

    /// Top ports selection (100, 1000, or full)
    #[arg(long, default_value = "1000")]
    top_ports: String,

    /// Discovery retries per port
    #[arg(long, default_value_t = 1)]
    retries: u32,

    /// Discovery rate (packets per second)
    #[arg(long, default_value_t = 50_000)]
    rate: u32,

    /// Log level
    #[arg(long, value_enum, default_value = "info")]
    log_level: LogLevel,

    /// Log format
    #[arg(long, value_enum, default_value = "plain")]
    log_format: LogFormat,
}

/// Splits each positional argument on commas and spaces.
fn split_targets(args: &[String]) -> Vec<String> {
    args.iter()
        .flat_map(|arg| arg.split([',', ' ']))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    let opt = Opt::parse();
    init_logger_with(opt.log_level.into(), opt.log_format).context("Failed to initialize logger")?;
    init_crypto_provider();

    let targets = split_targets(&opt.targets);
    let addrs = expand_targets(&targets).map_err(|e| anyhow::anyhow!("{e}"))?;
    info!(
        "Starting scan of {} IPs across {} targets: {:?}",
        addrs.len(),
        targets.len(),
        targets
    );

    let scan_type: ScanType = opt
        .scan_type
        .parse()
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    let discovery_cfg = DiscoveryConfig {
        scan_type,
        ports: opt.ports.clone(),
        top_ports: opt.top_ports.clone(),
        retries: opt.retries,
        rate: opt.rate,
    };
    let fingerprint_cfg = FingerprintConfig {
        default_timeout: std::time::Duration::from_millis(opt.timeout),
        fast_mode: opt.fast,
        udp: opt.udp,
        verbose: opt.verbose,
    };
    let engine = Arc::new(FingerprintEngine::new(
        Arc::new(PluginRegistry::with_defaults()),
        fingerprint_cfg,
    ));

    // Identified services stream to stdout as NDJSON through the typed
    // producer, keyed by IP like any other bus edge.
    let producer: Arc<NdjsonProducer<Service, tokio::io::Stdout>> =
        Arc::new(NdjsonProducer::new(tokio::io::stdout()));
    let on_event: OnEvent = {
        let producer = Arc::clone(&producer);
        Arc::new(move |service: Service| -> BoxFuture<'static, ()> {
            let producer = Arc::clone(&producer);
            Box::pin(async move {
                // A single failed record never aborts the scan.
                if let Err(e) = producer.publish(service.ip.as_bytes(), &service).await {
                    eprintln!("failed to emit service event: {e}");
                }
            })
        })
    };

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping discovery");
            signal_cancel.cancel();
        }
    });

    match scan_with_discovery_stream(
        Arc::new(ConnectDiscoverer),
        cancel,
        targets,
        discovery_cfg,
        engine,
        on_event,
    )
    .await
    {
        Ok(report) => {
            info!(
                "Scan complete: {} ports discovered, {} services identified ({} probed inline) in {:.2}s",
                report.discovered, report.identified, report.inlined, report.elapsed_seconds
            );
            Ok(())
        }
        Err(ScanError::Cancelled) => {
            info!("Scan cancelled");
            Ok(())
        }
        Err(e) => Err(anyhow::anyhow!("Failed running discovery+scan stream: {e}")),
    }
}

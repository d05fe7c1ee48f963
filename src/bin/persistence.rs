//! Persistence worker CLI: consume NDJSON service events, enrich hosts with
//! GeoIP/ASN data, and upsert them into the host store.
//!
//! The input stream is the broker edge: pipe the scanner's stdout straight
//! in, or point `--input` at a captured NDJSON file.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;

use hostscan::config::{LogFormat, LogLevel};
use hostscan::enrich::Enricher;
use hostscan::geoip::GeoIpReaders;
use hostscan::initialization::init_logger_with;
use hostscan::messaging::ndjson::NdjsonConsumer;
use hostscan::messaging::Consumer;
use hostscan::models::Service;
use hostscan::notifications::{Notifier, TelegramNotifier};
use hostscan::persistence::App;
use hostscan::storage::{HostRepository, SqliteHostRepository};

#[derive(Parser, Debug)]
#[command(
    name = "hostscan-persistence",
    about = "Consume scanner service events and persist/enrich hosts"
)]
struct Opt {
    /// NDJSON event stream: a file path, or '-' for stdin
    #[arg(long, default_value = "-")]
    input: String,

    /// Host store database path
    #[arg(long, default_value = "./hostscan.db")]
    db_path: PathBuf,

    /// Per-operation database timeout in seconds
    #[arg(long, default_value_t = 10)]
    db_timeout_secs: u64,

    /// Directory containing the GeoLite2 City and ASN .mmdb files
    #[arg(long)]
    geoip_path: PathBuf,

    /// Telegram bot token for new-service notifications
    #[arg(long)]
    telegram_token: Option<String>,

    /// Telegram chat id for new-service notifications
    #[arg(long)]
    telegram_chat_id: Option<i64>,

    /// Log level
    #[arg(long, value_enum, default_value = "info")]
    log_level: LogLevel,

    /// Log format
    #[arg(long, value_enum, default_value = "plain")]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> Result<()> {
    let opt = Opt::parse();
    init_logger_with(opt.log_level.into(), opt.log_format).context("Failed to initialize logger")?;

    let repo: Arc<dyn HostRepository> = Arc::new(
        SqliteHostRepository::connect(&opt.db_path, Duration::from_secs(opt.db_timeout_secs))
            .await
            .context("Failed to open host store")?,
    );

    let readers =
        GeoIpReaders::open_dir(&opt.geoip_path).context("Failed to open GeoIP databases")?;
    let enricher = Enricher::new(readers);

    let notifier: Option<Arc<dyn Notifier>> = match (&opt.telegram_token, opt.telegram_chat_id) {
        (Some(token), Some(chat_id)) => {
            info!("Telegram notifications enabled");
            Some(Arc::new(TelegramNotifier::new(token.clone(), chat_id)))
        }
        _ => None,
    };

    let consumer: Box<dyn Consumer<Service>> = if opt.input == "-" {
        Box::new(NdjsonConsumer::new(BufReader::new(tokio::io::stdin())))
    } else {
        let file = tokio::fs::File::open(&opt.input)
            .await
            .with_context(|| format!("Failed to open input file {}", opt.input))?;
        Box::new(NdjsonConsumer::new(BufReader::new(file)))
    };

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, shutting down");
            signal_cancel.cancel();
        }
    });

    let mut app = App::new(consumer, repo, enricher, notifier);
    app.run(&cancel).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_defaults() {
        let opt = Opt::parse_from(["hostscan-persistence", "--geoip-path", "/data/geoip"]);
        assert_eq!(opt.input, "-");
        assert_eq!(opt.db_timeout_secs, 10);
        assert!(opt.telegram_token.is_none());
    }

    #[test]
    fn geoip_path_is_required() {
        assert!(Opt::try_parse_from(["hostscan-persistence"]).is_err());
    }
}

use crate::config::parse::load_config;
use crate::delivery::{DeliveryError, HttpDelivery};
use crate::record::{LogRecord, Severity};
use crate::shipper::{LogShipper, LogSink};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] crate::config::parse::ConfigError),

    #[error("delivery client error: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("config has no 'endpoint' section; the run command needs an ingestion URL")]
    MissingEndpoint,

    #[error("failed to read stdin: {0}")]
    Stdin(#[from] std::io::Error),
}

pub async fn run(config_path: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = match config_path {
        Some(path) => path,
        None => {
            eprintln!("Error: config not found");
            eprintln!("Searched locations:");
            eprintln!("  ~/.config/logship/config.yml");
            eprintln!("  /etc/logship/config.yml");
            eprintln!("\nUse --config <path> to specify a config file, or run 'logship config init' to generate one.");
            std::process::exit(1);
        }
    };

    run_shipper(&config_path).await.map_err(|e| e.into())
}

async fn run_shipper(config_path: &Path) -> Result<(), RunError> {
    info!(config_path = %config_path.display(), "Loading configuration");
    let config = load_config(config_path)?;

    let endpoint = config.endpoint.as_ref().ok_or(RunError::MissingEndpoint)?;
    let adapter = Arc::new(HttpDelivery::new(endpoint)?);

    let shipper = LogShipper::from_config(&config, adapter);
    info!(
        destination = %config.destination(),
        endpoint = %endpoint.url,
        "Shipping stdin, press Ctrl+C or close stdin to stop"
    );

    let read_result = pump_stdin(&shipper).await;

    // Flush whatever was read even if stdin broke
    let report = shipper.shutdown().await;
    let stats = shipper.stats();
    info!(
        enqueued = stats.enqueued,
        dropped = stats.dropped,
        delivered = stats.events_delivered,
        lost = stats.events_lost,
        conflicts = stats.ordering_conflicts,
        "Shipper stopped"
    );
    if let Some(report) = report {
        if report.lost_events() > 0 {
            warn!(lost = report.lost_events(), "Some events could not be sent during shutdown");
        }
    }

    if let Err(e) = &read_result {
        error!(error = %e, "Reading stdin failed");
    }
    read_result.map_err(RunError::Stdin)
}

async fn pump_stdin(shipper: &LogShipper) -> std::io::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("Shutdown signal received");
                return Ok(());
            }
            line = lines.next_line() => {
                match line? {
                    Some(line) if line.trim().is_empty() => {}
                    Some(line) => shipper.submit(parse_line(&line)),
                    None => {
                        info!("End of input");
                        return Ok(());
                    }
                }
            }
        }
    }
}

/// Splits an optional leading level word off a line: `WARN disk almost full`,
/// `[error] timeout` and `info: started` are all recognized. Lines without one
/// are shipped at info.
pub fn parse_line(line: &str) -> LogRecord {
    let trimmed = line.trim_end();
    if let Some((first, rest)) = trimmed.split_once(char::is_whitespace) {
        let word = first.trim_matches(|c: char| c == '[' || c == ']' || c == ':');
        if let Ok(severity) = word.parse::<Severity>() {
            return LogRecord::new(severity, rest.trim_start()).with_logger("stdin");
        }
    }
    LogRecord::new(Severity::Info, trimmed).with_logger("stdin")
}

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use clap_derive::Parser;
use tracing::info;

use ewelink_hub_rs::logging::{LogConfig, RotationPeriod, init_logging};
use ewelink_hub_rs::replay::{ReplayScript, ReplaySession};
use ewelink_hub_rs::telemetry::register_metric_descriptions;
use ewelink_hub_rs::{LoggingPlatform, Settings};

#[derive(Parser, Debug)]
pub struct Params {
    /// JSON-lines script of device declarations, writes and device updates
    script: String,
    /// Settings file path (if not set, default settings are used)
    #[clap(long)]
    settings: Option<String>,
    /// Directory for rolling log files (if not set, logs go to stdout only)
    #[clap(long)]
    log_dir: Option<String>,
    /// Prefix of the rolling log file names
    #[clap(long, default_value = "ewelink-bridge")]
    log_prefix: String,
    /// Log rotation period: minutely, hourly, daily or never
    #[clap(long, default_value = "daily")]
    rotation: RotationPeriod,
    /// Number of rotated log files to keep (0 keeps all)
    #[clap(long, default_value = "7")]
    max_log_files: usize,
    /// Time to wait after the last event for pending timers, in milliseconds
    #[clap(long, default_value = "11000")]
    tail_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let params = Params::parse();

    let log_config = params.log_dir.as_ref().map(|dir| LogConfig {
        log_dir: dir.clone(),
        log_prefix: params.log_prefix.clone(),
        rotation: params.rotation,
        max_log_files: params.max_log_files,
    });
    let _log_guard = init_logging(log_config.as_ref()).context("Failed to set up logging")?;
    register_metric_descriptions();

    let settings = match &params.settings {
        Some(path) => Settings::load(path).context("Invalid settings file")?,
        None => Settings::default(),
    };

    let script = ReplayScript::load(&params.script)
        .await
        .with_context(|| format!("Failed to read script {}", params.script))?;
    info!(
        "Loaded {} devices and {} events from {}",
        script.devices.len(),
        script.events.len(),
        params.script
    );

    let session = ReplaySession::setup(&script.devices, Arc::new(LoggingPlatform), &settings).await?;
    session
        .run(&script.events, Duration::from_millis(params.tail_ms))
        .await;

    Ok(())
}

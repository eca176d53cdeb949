//! The periodic dispatch wrapper: one scheduling pass as the container's
//! sole process.

use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::Result;
use tracing::{error, info};

use espa_core::dispatch::{run_pass, DispatchConfig};
use espa_cron::{init_tracing, load_configs, log_config_hash};

/// Optional overrides for the pipeline binaries, mainly for test rigs.
const SELECTOR_BIN_ENV: &str = "ESPA_SELECTOR_BIN";
const MAPPER_BIN_ENV: &str = "ESPA_MAPPER_BIN";

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Scheduling pass failed: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    init_tracing(None)?;

    let (processing, cron) = load_configs()?;
    log_config_hash(&processing);

    let mut config = DispatchConfig::resolve(&processing.api);
    config.log_dir = cron.log_dir.clone();
    config.interactive = std::io::stdin().is_terminal();

    if let Ok(selector) = std::env::var(SELECTOR_BIN_ENV) {
        config.selector_bin = PathBuf::from(selector);
    }
    if let Ok(mapper) = std::env::var(MAPPER_BIN_ENV) {
        config.mapper_bin = PathBuf::from(mapper);
    }

    let summary = run_pass(&config).await?;
    info!(
        "Pass complete (selector: {:?}, mapper: {:?}, reset-status: {}, handle-orders: {})",
        summary.selector_status,
        summary.mapper_status,
        summary.reset_status_ok,
        summary.handle_orders_ok
    );

    Ok(())
}

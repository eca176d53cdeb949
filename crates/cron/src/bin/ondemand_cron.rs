//! Selection pass entry point.
//!
//! Queries the production API for requests that need to be processed and
//! emits them as JSON lines on stdout for the mapper.

use std::str::FromStr;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::error;

use espa_cron::{init_tracing, load_configs, log_config_hash};
use espa_core::request::PLOT_PRODUCT_TYPE;
use espa_core::selector::{run_selection, validate_product_types, Priority, SelectorOptions};
use espa_core::HttpProductionApi;

#[derive(Parser, Debug)]
#[command(
    name = "ondemand-cron",
    version,
    about = "Selects product requests for the on-demand processing system"
)]
struct Cli {
    /// Only process requests with this priority.
    #[arg(long, value_parser = Priority::from_str)]
    priority: Priority,

    /// Only process requests for the specified product type(s).
    #[arg(long, required = true, num_args = 1.., value_name = "PRODUCT_TYPE")]
    product_types: Vec<String>,

    /// Max number of requests to process.
    #[arg(long, default_value_t = 500)]
    limit: u32,

    /// Only process requests for the specified user.
    #[arg(long)]
    user: Option<String>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = validate_product_types(&cli.product_types) {
        eprintln!("{e}");
        std::process::exit(1);
    }

    if let Err(e) = run(cli).await {
        // The file-backed subscriber may not exist yet when configuration
        // loading is what failed.
        error!("Processing failed: {e:#}");
        eprintln!("Processing failed: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let (processing, cron) = load_configs()?;

    // Plot selections log separately from scene selections.
    let log_filename = if cli.product_types.iter().any(|t| t == PLOT_PRODUCT_TYPE) {
        &cron.plot_log_filename
    } else {
        &cron.log_filename
    };
    init_tracing(Some(cron.log_dir.join(log_filename)))?;
    log_config_hash(&processing);

    let api = HttpProductionApi::new(&processing.api);
    let options = SelectorOptions {
        priority: cli.priority,
        limit: cli.limit,
        user: cli.user,
        product_types: cli.product_types,
    };

    let mut stdout = tokio::io::stdout();
    run_selection(&api, &cron, &processing, &options, &mut stdout)
        .await
        .context("Selection pass failed")?;

    Ok(())
}

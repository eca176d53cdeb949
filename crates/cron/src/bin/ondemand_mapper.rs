//! Mapper entry point.
//!
//! Reads all request lines from stdin and processes them. Individual
//! request failures are reported through the production API; the mapper
//! itself always exits cleanly so the surrounding pass keeps its fixed
//! shape.

use anyhow::Result;
use clap::Parser;
use tokio::io::BufReader;
use tracing::{error, info};

use espa_core::joblog::mapper_log_path;
use espa_core::mapper::{run_mapper, MapperContext};
use espa_cron::{init_tracing, load_configs};

#[derive(Parser, Debug)]
#[command(
    name = "ondemand-mapper",
    version,
    about = "Processes product requests read from stdin"
)]
struct Cli {
    /// Developer mode: skip request pacing and keep processing
    /// directories for inspection.
    #[arg(long)]
    developer: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        // The file-backed subscriber may not exist yet when configuration
        // loading is what failed.
        error!("Processing failed: {e:#}");
        eprintln!("Processing failed: {e:#}");
    }

    // A failed product is reported through the API, never through the
    // exit status; the dispatch wrapper does not branch on it anyway.
    std::process::exit(0);
}

async fn run(cli: Cli) -> Result<()> {
    let (processing, cron) = load_configs()?;
    init_tracing(Some(mapper_log_path(&cron.log_dir)))?;

    // The science tools find their auxiliary archives through the
    // environment.
    if let Some(aux_dir) = &processing.aux_dir {
        std::env::set_var("ESPA_AUX_DIR", aux_dir);
    }

    let ctx = MapperContext::new(processing, cron.log_dir.clone())
        .with_developer_mode(cli.developer);

    let stdin = BufReader::new(tokio::io::stdin());
    let dispatched = run_mapper(stdin, &ctx).await;
    info!("Dispatched {dispatched} request(s)");

    Ok(())
}

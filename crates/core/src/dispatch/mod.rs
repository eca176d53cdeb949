//! The periodic dispatch wrapper.
//!
//! Runs one scheduling pass end to end: clean out prior logs, pipe the
//! selector into the mapper, dump the pass logs, poke the production API,
//! and finish with the tarball housekeeping check. The pass is
//! deliberately lossy: selector diagnostics are discarded and the API
//! pokes fire regardless of how the pipeline fared.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{info, warn};
use uuid::Uuid;

use crate::metrics;

/// Selector arguments for the periodic pass: one request per pass, any
/// priority, ABI products.
pub const SELECTOR_ARGS: [&str; 6] = [
    "--priority",
    "all",
    "--limit",
    "1",
    "--product-types",
    "abi",
];

/// Mapper argument for the periodic pass.
pub const MAPPER_ARGS: [&str; 1] = ["--developer"];

/// Glob prefix/suffix of the tarball housekeeping check.
const TARBALL_PREFIX: &str = "espa-jbrinkmann";
const TARBALL_SUFFIX: &str = ".tar.gz";

/// Error type for the dispatch pass.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("failed to spawn [{binary}]: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Configuration for one dispatch pass.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub selector_bin: PathBuf,
    pub mapper_bin: PathBuf,
    /// Directory whose `*.log` files are cleaned and concatenated.
    pub log_dir: PathBuf,
    /// Directory probed for the housekeeping tarball.
    pub work_dir: PathBuf,
    /// Production API base URL, `http://<api-host>:4004`.
    pub api_base: String,
    /// Open an interactive shell when the housekeeping tarball exists.
    /// Off unless attached to a terminal.
    pub interactive: bool,
    pub shell: String,
}

impl DispatchConfig {
    /// Defaults: sibling binaries next to the current executable, logs and
    /// tarball probe in the current directory.
    pub fn resolve(api_base: impl Into<String>) -> Self {
        let bin_dir = std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."));

        Self {
            selector_bin: bin_dir.join("ondemand-cron"),
            mapper_bin: bin_dir.join("ondemand-mapper"),
            log_dir: PathBuf::from("."),
            work_dir: PathBuf::from("."),
            api_base: api_base.into(),
            interactive: false,
            shell: std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string()),
        }
    }
}

/// What one pass did, for logging and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassSummary {
    pub selector_status: Option<i32>,
    pub mapper_status: Option<i32>,
    pub reset_status_ok: bool,
    pub handle_orders_ok: bool,
    pub tarball_found: bool,
}

/// Run one scheduling pass.
pub async fn run_pass(config: &DispatchConfig) -> Result<PassSummary, DispatchError> {
    let pass_id = Uuid::new_v4();
    let start = Instant::now();
    info!("Starting scheduling pass {pass_id}");

    remove_prior_logs(&config.log_dir).await?;

    let (selector_status, mapper_status) = run_pipeline(config).await?;
    // The pass presses on whatever the pipeline exit status was; logs and
    // the API pokes below are how problems surface.
    info!(
        "Pipeline finished (selector: {selector_status:?}, mapper: {mapper_status:?})"
    );

    concatenate_logs(&config.log_dir).await?;

    let reset_status_ok = poke(&config.api_base, "reset-status").await;
    let handle_orders_ok = poke(&config.api_base, "handle-orders").await;

    let tarball_found = check_for_tarball(config).await?;

    metrics::PASS_DURATION
        .with_label_values(&[])
        .observe(start.elapsed().as_secs_f64());
    info!("Scheduling pass {pass_id} finished");

    Ok(PassSummary {
        selector_status,
        mapper_status,
        reset_status_ok,
        handle_orders_ok,
        tarball_found,
    })
}

/// Remove every `*.log` file so the pass starts from a clean slate.
async fn remove_prior_logs(log_dir: &Path) -> Result<(), DispatchError> {
    let mut entries = match tokio::fs::read_dir(log_dir).await {
        Ok(entries) => entries,
        Err(_) => return Ok(()),
    };

    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.ends_with(".log") {
            if let Err(e) = tokio::fs::remove_file(entry.path()).await {
                warn!("Failed to remove prior log [{name}]: {e}");
            }
        }
    }

    Ok(())
}

/// Spawn `selector | mapper` and wait for both.
async fn run_pipeline(
    config: &DispatchConfig,
) -> Result<(Option<i32>, Option<i32>), DispatchError> {
    let mut selector = Command::new(&config.selector_bin)
        .args(SELECTOR_ARGS)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        // Selection diagnostics are not surfaced by the wrapper.
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| DispatchError::Spawn {
            binary: config.selector_bin.display().to_string(),
            source: e,
        })?;

    let selector_stdout = selector
        .stdout
        .take()
        .expect("selector stdout was requested piped");
    let mapper_stdin: Stdio = selector_stdout
        .try_into()
        .map_err(|e: std::io::Error| DispatchError::Io(e))?;

    let mut mapper = Command::new(&config.mapper_bin)
        .args(MAPPER_ARGS)
        .stdin(mapper_stdin)
        .spawn()
        .map_err(|e| DispatchError::Spawn {
            binary: config.mapper_bin.display().to_string(),
            source: e,
        })?;

    let selector_status = selector.wait().await?;
    let mapper_status = mapper.wait().await?;

    Ok((selector_status.code(), mapper_status.code()))
}

/// Concatenate the pass's `espa-*.log` files to stdout.
async fn concatenate_logs(log_dir: &Path) -> Result<(), DispatchError> {
    let mut entries = match tokio::fs::read_dir(log_dir).await {
        Ok(entries) => entries,
        Err(_) => return Ok(()),
    };

    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with("espa-") && name.ends_with(".log") {
            names.push(name);
        }
    }
    names.sort();

    let mut stdout = tokio::io::stdout();
    for name in names {
        match tokio::fs::read(log_dir.join(&name)).await {
            Ok(contents) => {
                stdout.write_all(&contents).await?;
            }
            Err(e) => warn!("Failed to read log [{name}]: {e}"),
        }
    }
    stdout.flush().await?;

    Ok(())
}

/// Fire one production API GET; failures are logged, never propagated.
async fn poke(api_base: &str, endpoint: &str) -> bool {
    let url = format!(
        "{}/production-api/v0/{endpoint}",
        api_base.trim_end_matches('/')
    );
    info!("GET {url}");

    match reqwest::get(&url).await {
        Ok(response) if response.status().is_success() => true,
        Ok(response) => {
            warn!("{endpoint} returned HTTP {}", response.status());
            false
        }
        Err(e) => {
            warn!("{endpoint} call failed: {e}");
            false
        }
    }
}

/// The tarball housekeeping check closing every pass: report the presence
/// of a developer tarball drop and, when interactive, open a shell to
/// poke at it.
async fn check_for_tarball(config: &DispatchConfig) -> Result<bool, DispatchError> {
    let mut found = false;

    if let Ok(mut entries) = tokio::fs::read_dir(&config.work_dir).await {
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with(TARBALL_PREFIX) && name.ends_with(TARBALL_SUFFIX) {
                found = true;
                break;
            }
        }
    }

    if found {
        println!("YES!");
        if config.interactive {
            let status = Command::new(&config.shell)
                .current_dir(&config.work_dir)
                .status()
                .await;
            if let Err(e) = status {
                warn!("Failed to open interactive shell: {e}");
            }
        }
    } else {
        println!("nope!");
    }

    Ok(found)
}

//! Input data staging.
//!
//! Pulls the Level-1 input product into the stage directory (HTTP download
//! or local copy) and unpacks it into the work directory.

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::command::{args, CommandError, CommandRunner};
use crate::joblog::JobLogHandle;
use crate::sensor::ProductFamily;

/// Maximum number of times to attempt a download.
const MAX_DOWNLOAD_ATTEMPTS: usize = 3;

/// Seconds slept between download attempts.
const DOWNLOAD_RETRY_SLEEP_SECONDS: u64 = 2;

/// Error type for staging operations.
#[derive(Debug, thiserror::Error)]
pub enum StagingError {
    #[error("No download URL provided for [{0}]")]
    MissingDownloadUrl(String),

    #[error("Failed to download [{url}] after {attempts} attempts: {last_error}")]
    DownloadFailed {
        url: String,
        attempts: usize,
        last_error: String,
    },

    #[error("Failed to unpack input: {0}")]
    Unpack(#[from] CommandError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Download a URL to a file, retrying transient failures.
pub async fn download_to_file(
    client: &reqwest::Client,
    url: &str,
    destination: &Path,
) -> Result<(), StagingError> {
    let mut last_error = String::new();

    for attempt in 1..=MAX_DOWNLOAD_ATTEMPTS {
        match try_download(client, url, destination).await {
            Ok(()) => return Ok(()),
            Err(e) => {
                warn!("Download attempt {attempt} of [{url}] failed: {e}");
                last_error = e;
                if attempt < MAX_DOWNLOAD_ATTEMPTS {
                    tokio::time::sleep(Duration::from_secs(DOWNLOAD_RETRY_SLEEP_SECONDS)).await;
                }
            }
        }
    }

    Err(StagingError::DownloadFailed {
        url: url.to_string(),
        attempts: MAX_DOWNLOAD_ATTEMPTS,
        last_error,
    })
}

async fn try_download(
    client: &reqwest::Client,
    url: &str,
    destination: &Path,
) -> Result<(), String> {
    let response = client.get(url).send().await.map_err(|e| e.to_string())?;

    let status = response.status();
    if !status.is_success() {
        return Err(format!("HTTP {status}"));
    }

    let mut file = tokio::fs::File::create(destination)
        .await
        .map_err(|e| e.to_string())?;

    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| e.to_string())?;
        file.write_all(&chunk).await.map_err(|e| e.to_string())?;
    }

    file.flush().await.map_err(|e| e.to_string())
}

/// Unpack a tarball into the destination directory.
pub async fn untar_data(
    runner: &dyn CommandRunner,
    source_file: &Path,
    destination_dir: &Path,
) -> Result<String, CommandError> {
    let source = source_file.to_string_lossy();
    let destination = destination_dir.to_string_lossy();
    runner
        .run(
            "tar",
            &args(["-xf", source.as_ref(), "-C", destination.as_ref()]),
            None,
        )
        .await
}

/// Stage the input product for processing.
///
/// The source lands in `stage_dir` and the unpacked (Landsat) or copied
/// (MODIS) data in `work_dir`.
pub async fn stage_input(
    runner: &dyn CommandRunner,
    client: &reqwest::Client,
    joblog: &JobLogHandle,
    product_id: &str,
    download_url: Option<&str>,
    family: ProductFamily,
    stage_dir: &Path,
    work_dir: &Path,
) -> Result<(), StagingError> {
    let url =
        download_url.ok_or_else(|| StagingError::MissingDownloadUrl(product_id.to_string()))?;

    let file_name = format!("{product_id}{}", family.input_extension());
    let staged_file = stage_dir.join(&file_name);

    joblog
        .info(format!("Staging [{url}] to [{}]", staged_file.display()))
        .await;

    if url.starts_with("http://") || url.starts_with("https://") {
        download_to_file(client, url, &staged_file).await?;
    } else {
        // Local path, already on a mounted filesystem.
        let source = PathBuf::from(url.strip_prefix("file://").unwrap_or(url));
        tokio::fs::copy(&source, &staged_file).await?;
    }

    match family {
        ProductFamily::Landsat => {
            info!("Unpacking [{}]", staged_file.display());
            let output = untar_data(runner, &staged_file, work_dir).await?;
            if !output.is_empty() {
                joblog.info(output).await;
            }
            tokio::fs::remove_file(&staged_file).await?;
        }
        ProductFamily::Modis => {
            let work_file = work_dir.join(&file_name);
            tokio::fs::rename(&staged_file, &work_file).await?;
        }
    }

    Ok(())
}

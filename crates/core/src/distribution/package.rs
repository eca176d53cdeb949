//! Product packaging: gzipped tarball plus checksum file.

use std::path::{Path, PathBuf};

use tokio::io::AsyncReadExt;
use tracing::{debug, info};

use crate::command::{args, CommandRunner};

use super::DistributionError;

/// Filename extension of the checksum file.
pub const CHECKSUM_EXTENSION: &str = "md5";

/// A packaged product ready for distribution.
#[derive(Debug, Clone)]
pub struct PackagedProduct {
    pub product_file: PathBuf,
    pub cksum_file: PathBuf,
    /// `{hex}  {filename}`, the md5sum line format.
    pub cksum_value: String,
}

/// Package the contents of `source_dir` into
/// `{destination_dir}/{product_name}.tar.gz` with a checksum file beside it.
///
/// Prior packages for the same product (any timestamp suffix) are removed
/// first so a re-run replaces its earlier output.
pub async fn package_product(
    runner: &dyn CommandRunner,
    source_dir: &Path,
    destination_dir: &Path,
    product_name: &str,
) -> Result<PackagedProduct, DistributionError> {
    tokio::fs::create_dir_all(destination_dir).await?;

    remove_stale_packages(destination_dir, product_name).await?;

    let product_file = destination_dir.join(format!("{product_name}.tar.gz"));

    info!("Packaging completed product to {}", product_file.display());

    // The work directory contents are tarred by name so the archive root
    // holds the product files directly.
    let mut entries = Vec::new();
    let mut dir = tokio::fs::read_dir(source_dir).await?;
    while let Some(entry) = dir.next_entry().await? {
        entries.push(entry.file_name().to_string_lossy().into_owned());
    }
    entries.sort();

    let product_path = product_file.to_string_lossy();
    let mut tar_args = args(["-czf", product_path.as_ref()]);
    tar_args.extend(entries);
    runner.run("tar", &tar_args, Some(source_dir)).await?;

    set_world_readable(&product_file).await?;

    // Verify the archive is readable before advertising it.
    runner
        .run("tar", &args(["-tf", product_path.as_ref()]), None)
        .await?;

    let digest = md5_file(&product_file).await?;
    let cksum_value = format!(
        "{digest}  {}",
        product_file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    );
    debug!("Generated cksum: {cksum_value}");

    let cksum_file = destination_dir.join(format!("{product_name}.{CHECKSUM_EXTENSION}"));
    tokio::fs::write(&cksum_file, &cksum_value).await?;

    Ok(PackagedProduct {
        product_file,
        cksum_file,
        cksum_value,
    })
}

/// Remove earlier packages of the same product. The trailing `-SC…`
/// timestamp segment is what varies between runs.
async fn remove_stale_packages(
    destination_dir: &Path,
    product_name: &str,
) -> Result<(), DistributionError> {
    let prefix = match product_name.rsplit_once('-') {
        Some((prefix, _)) => format!("{prefix}-"),
        None => return Ok(()),
    };

    let mut dir = tokio::fs::read_dir(destination_dir).await?;
    while let Some(entry) = dir.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with(&prefix) {
            tokio::fs::remove_file(entry.path()).await?;
        }
    }

    Ok(())
}

#[cfg(unix)]
async fn set_world_readable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o644)).await
}

#[cfg(not(unix))]
async fn set_world_readable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

/// Compute the hex MD5 digest of a file, streaming.
pub async fn md5_file(path: &Path) -> std::io::Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut context = md5::Context::new();
    let mut buffer = vec![0u8; 64 * 1024];

    loop {
        let read = file.read(&mut buffer).await?;
        if read == 0 {
            break;
        }
        context.consume(&buffer[..read]);
    }

    Ok(format!("{:x}", context.compute()))
}

//! Local (mounted cache) distribution.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::info;

use super::package::{md5_file, PackagedProduct};
use super::{DistributedProduct, DistributionError, Distributor};

/// Distributor for a locally mounted online cache.
///
/// Packages land in `{distribution_dir}/orders/{order_id}` and are
/// re-verified against the recorded checksum after the move.
pub struct LocalDistributor {
    distribution_dir: PathBuf,
}

impl LocalDistributor {
    pub fn new(distribution_dir: PathBuf) -> Self {
        Self { distribution_dir }
    }
}

#[async_trait]
impl Distributor for LocalDistributor {
    async fn distribute(
        &self,
        package: &PackagedProduct,
        order_id: &str,
    ) -> Result<DistributedProduct, DistributionError> {
        let destination_dir = self.distribution_dir.join("orders").join(order_id);
        tokio::fs::create_dir_all(&destination_dir).await?;

        let product_name = package
            .product_file
            .file_name()
            .ok_or_else(|| std::io::Error::other("package has no file name"))?;
        let cksum_name = package
            .cksum_file
            .file_name()
            .ok_or_else(|| std::io::Error::other("checksum has no file name"))?;

        let destination_product = destination_dir.join(product_name);
        let destination_cksum = destination_dir.join(cksum_name);

        move_file(&package.product_file, &destination_product).await?;
        move_file(&package.cksum_file, &destination_cksum).await?;

        // Verify the cache copy against the checksum computed at packaging.
        let actual = md5_file(&destination_product).await?;
        let expected = package
            .cksum_value
            .split_whitespace()
            .next()
            .unwrap_or_default();
        if actual != expected {
            return Err(DistributionError::ChecksumMismatch {
                file: destination_product.display().to_string(),
                expected: expected.to_string(),
                actual,
            });
        }

        info!(
            "Distributed [{}] to the local cache",
            destination_product.display()
        );

        Ok(DistributedProduct {
            product_file: destination_product.display().to_string(),
            cksum_file: destination_cksum.display().to_string(),
        })
    }
}

/// Rename, falling back to copy+remove across filesystems.
async fn move_file(source: &std::path::Path, destination: &std::path::Path) -> std::io::Result<()> {
    if source == destination {
        return Ok(());
    }
    match tokio::fs::rename(source, destination).await {
        Ok(()) => Ok(()),
        Err(_) => {
            tokio::fs::copy(source, destination).await?;
            tokio::fs::remove_file(source).await
        }
    }
}

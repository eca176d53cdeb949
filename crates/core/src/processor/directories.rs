//! Per-product processing directory layout.
//!
//! Each product processes under `{base}/{orderid}-{product_id}/` with
//! `stage`, `work` and `output` subdirectories. With the local
//! distribution method the output directory is the distribution directory
//! itself, so packaging writes straight to the online cache.

use std::path::{Path, PathBuf};

use crate::config::{DistributionMethod, ProcessingConfig};
use crate::distribution::DistributionError;

/// The directories one product processes in.
#[derive(Debug, Clone)]
pub struct ProcessingDirectories {
    pub product_dir: PathBuf,
    pub stage_dir: PathBuf,
    pub work_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl ProcessingDirectories {
    /// Create a fresh directory set, removing any leftovers from a prior
    /// run of the same product.
    pub async fn create(
        config: &ProcessingConfig,
        order_id: &str,
        product_id: &str,
    ) -> Result<Self, DistributionError> {
        let base = config.base_work_dir();
        let product_dir = base.join(format!("{order_id}-{product_id}"));

        // A previous developer run may have left the tree behind.
        let _ = tokio::fs::remove_dir_all(&product_dir).await;

        let stage_dir = product_dir.join("stage");
        let work_dir = product_dir.join("work");
        tokio::fs::create_dir_all(&stage_dir).await?;
        tokio::fs::create_dir_all(&work_dir).await?;

        let output_dir = match config.distribution_method {
            DistributionMethod::Local => {
                let dir = config
                    .distribution_dir
                    .clone()
                    .ok_or(DistributionError::NotConfigured(
                        "distribution_dir is required for the local distribution method",
                    ))?;
                tokio::fs::create_dir_all(&dir).await?;
                dir
            }
            DistributionMethod::Remote => {
                let dir = product_dir.join("output");
                tokio::fs::create_dir_all(&dir).await?;
                dir
            }
        };

        Ok(Self {
            product_dir,
            stage_dir,
            work_dir,
            output_dir,
        })
    }

    /// Remove the product directory tree. Errors are ignored; this runs
    /// on both the success and failure paths to free disk for the rest of
    /// the system.
    pub async fn remove(&self) {
        let _ = tokio::fs::remove_dir_all(&self.product_dir).await;
    }

    /// Whether `path` is inside the product directory.
    pub fn contains(&self, path: &Path) -> bool {
        path.starts_with(&self.product_dir)
    }
}

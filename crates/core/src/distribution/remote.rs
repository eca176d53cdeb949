//! Remote (cache host) distribution over ssh/scp.
//!
//! Assumes key-based ssh access between the processing node and the cache
//! hosts, as the operational environment provides.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::command::{args, CommandRunner};

use super::package::PackagedProduct;
use super::{DistributedProduct, DistributionError, Distributor, REMOTE_CACHE_DIRECTORY};

const SSH_OPTIONS: [&str; 3] = ["-q", "-o", "StrictHostKeyChecking=no"];

/// Distributor that transfers products to a cache host.
pub struct RemoteDistributor {
    runner: Arc<dyn CommandRunner>,
    hosts: Vec<String>,
    cache_directory: String,
    immutable: bool,
}

impl RemoteDistributor {
    pub fn new(runner: Arc<dyn CommandRunner>, hosts: Vec<String>, immutable: bool) -> Self {
        Self {
            runner,
            hosts,
            cache_directory: REMOTE_CACHE_DIRECTORY.to_string(),
            immutable,
        }
    }

    pub fn with_cache_directory(mut self, cache_directory: impl Into<String>) -> Self {
        self.cache_directory = cache_directory.into();
        self
    }

    /// Probe the configured hosts in order and return the first that
    /// answers an ssh no-op.
    async fn select_host(&self) -> Result<&str, DistributionError> {
        for host in &self.hosts {
            let mut probe = args(SSH_OPTIONS);
            probe.extend(args([host.as_str(), "true"]));
            match self.runner.run("ssh", &probe, None).await {
                Ok(_) => return Ok(host),
                Err(e) => warn!("Cache host [{host}] unreachable: {e}"),
            }
        }

        Err(DistributionError::NoReachableHost(self.hosts.join(",")))
    }

    async fn ssh(&self, host: &str, command: &[&str]) -> Result<String, DistributionError> {
        let mut full = args(SSH_OPTIONS);
        full.push(host.to_string());
        full.extend(command.iter().map(|s| s.to_string()));
        Ok(self.runner.run("ssh", &full, None).await?)
    }

    async fn scp(&self, source: &Path, host: &str, destination: &str) -> Result<(), DistributionError> {
        let source = source.to_string_lossy();
        let target = format!("{host}:{destination}");
        self.runner
            .run("scp", &args(["-q", source.as_ref(), target.as_str()]), None)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Distributor for RemoteDistributor {
    async fn distribute(
        &self,
        package: &PackagedProduct,
        order_id: &str,
    ) -> Result<DistributedProduct, DistributionError> {
        let host = self.select_host().await?;
        let destination_dir = format!("{}/{order_id}", self.cache_directory);

        info!("Creating destination directory {destination_dir} on {host}");
        self.ssh(host, &["mkdir", "-p", destination_dir.as_str()])
            .await?;

        let product_name = package
            .product_file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let cksum_name = package
            .cksum_file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let destination_product = format!("{destination_dir}/{product_name}");
        let destination_cksum = format!("{destination_dir}/{cksum_name}");

        // Replace any partial copies from a previous attempt. The product
        // prefix without its timestamp segment identifies earlier runs.
        let stale = match product_name.rsplit_once('-') {
            Some((prefix, _)) => format!("{destination_dir}/{prefix}-*"),
            None => destination_product.clone(),
        };
        if self.immutable {
            // Clear the immutable attribute first so removal can succeed.
            let _ = self
                .ssh(host, &["sudo", "chattr", "-if", stale.as_str()])
                .await;
        }
        self.ssh(host, &["rm", "-f", stale.as_str()]).await?;

        self.scp(&package.cksum_file, host, &destination_cksum).await?;
        self.scp(&package.product_file, host, &destination_product).await?;

        if self.immutable {
            self.ssh(host, &["sudo", "chattr", "+i", destination_product.as_str()])
                .await?;
        }

        // Verify with the remote checksum tool.
        let remote_cksum = self
            .ssh(host, &["md5sum", destination_product.as_str()])
            .await?;
        let expected = package
            .cksum_value
            .split_whitespace()
            .next()
            .unwrap_or_default();
        let actual = remote_cksum.split_whitespace().next().unwrap_or_default();
        if !expected.is_empty() && actual != expected {
            return Err(DistributionError::ChecksumMismatch {
                file: destination_product,
                expected: expected.to_string(),
                actual: actual.to_string(),
            });
        }

        info!("Distributed [{destination_product}] to cache host [{host}]");

        Ok(DistributedProduct {
            product_file: destination_product,
            cksum_file: destination_cksum,
        })
    }
}

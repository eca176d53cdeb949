//! Product packaging and distribution.

mod local;
mod package;
mod remote;

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::command::CommandError;
use crate::metrics;

pub use local::LocalDistributor;
pub use package::{package_product, PackagedProduct};
pub use remote::RemoteDistributor;

/// Maximum number of times to attempt packaging.
pub const MAX_PACKAGING_ATTEMPTS: usize = 3;

/// Maximum number of times to attempt distribution.
pub const MAX_DISTRIBUTION_ATTEMPTS: usize = 5;

/// Completed orders live under this directory on the cache hosts.
pub const REMOTE_CACHE_DIRECTORY: &str = "/data2/science_lsrd/LSRD/orders";

const RETRY_SLEEP_SECONDS: u64 = 2;
const RETRY_SLEEP_GROWTH: f64 = 1.5;

/// Error type for packaging and distribution.
#[derive(Debug, thiserror::Error)]
pub enum DistributionError {
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Checksum verification failed for [{file}]: expected {expected}, got {actual}")]
    ChecksumMismatch {
        file: String,
        expected: String,
        actual: String,
    },

    #[error("No reachable cache host among [{0}]")]
    NoReachableHost(String),

    #[error("Distribution not configured: {0}")]
    NotConfigured(&'static str),

    #[error("{operation} failed after {attempts} attempts: {last_error}")]
    MaxAttempts {
        operation: &'static str,
        attempts: usize,
        last_error: String,
    },
}

/// Destination paths of a distributed product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributedProduct {
    pub product_file: String,
    pub cksum_file: String,
}

/// Places a packaged product on the online cache.
#[async_trait]
pub trait Distributor: Send + Sync {
    async fn distribute(
        &self,
        package: &PackagedProduct,
        order_id: &str,
    ) -> Result<DistributedProduct, DistributionError>;
}

/// Package the work directory and hand the product to the distributor,
/// retrying each stage independently.
pub async fn distribute_product(
    distributor: &dyn Distributor,
    runner: &dyn crate::command::CommandRunner,
    work_dir: &Path,
    output_dir: &Path,
    product_name: &str,
    order_id: &str,
) -> Result<DistributedProduct, DistributionError> {
    let package = retry(
        "packaging",
        MAX_PACKAGING_ATTEMPTS,
        &metrics::PACKAGING_ATTEMPTS,
        || package_product(runner, work_dir, output_dir, product_name),
    )
    .await?;

    retry(
        "distribution",
        MAX_DISTRIBUTION_ATTEMPTS,
        &metrics::DISTRIBUTION_ATTEMPTS,
        || distributor.distribute(&package, order_id),
    )
    .await
}

async fn retry<T, F, Fut>(
    operation: &'static str,
    max_attempts: usize,
    counter: &prometheus::IntCounter,
    mut call: F,
) -> Result<T, DistributionError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, DistributionError>>,
{
    let mut sleep_seconds = RETRY_SLEEP_SECONDS as f64;
    let mut last_error = String::new();

    for attempt in 1..=max_attempts {
        counter.inc();
        match call().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                warn!("{operation} attempt {attempt} of {max_attempts} failed: {e}");
                last_error = e.to_string();
                if attempt < max_attempts {
                    tokio::time::sleep(Duration::from_secs_f64(sleep_seconds)).await;
                    sleep_seconds *= RETRY_SLEEP_GROWTH;
                }
            }
        }
    }

    Err(DistributionError::MaxAttempts {
        operation,
        attempts: max_attempts,
        last_error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_retry_succeeds_after_transient_failures() {
        let calls = AtomicUsize::new(0);
        let counter = prometheus::IntCounter::new("t1", "t1").unwrap();

        let result = retry("packaging", 3, &counter, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(DistributionError::NotConfigured("boom"))
                } else {
                    Ok(42)
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(result, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(counter.get(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_gives_up_after_max_attempts() {
        let counter = prometheus::IntCounter::new("t2", "t2").unwrap();
        let result: Result<(), _> = retry("distribution", 5, &counter, || async {
            Err(DistributionError::NotConfigured("always"))
        })
        .await;

        match result.unwrap_err() {
            DistributionError::MaxAttempts {
                operation,
                attempts,
                ..
            } => {
                assert_eq!(operation, "distribution");
                assert_eq!(attempts, 5);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}

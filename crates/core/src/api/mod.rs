//! Production API client.
//!
//! The order tracker exposes an HTTP API on the production host; every
//! status transition and work query in this system goes through it.

mod http;
mod types;

use std::time::Duration;

use tracing::{error, warn};

pub use http::HttpProductionApi;
pub use types::{ApiError, ProductionApi, QueuedProduct};

/// Number of seconds to sleep when errors are encountered before
/// attempting the task again.
pub const DEFAULT_SLEEP_SECONDS: u64 = 2;

/// Maximum number of times to attempt setting the product error.
pub const MAX_SET_PRODUCT_ERROR_ATTEMPTS: usize = 5;

/// Growth factor applied to the sleep between attempts.
pub const SLEEP_GROWTH_FACTOR: f64 = 1.5;

/// Report a product failure, retrying so transient tracker outages do not
/// leave a failed product stuck in `processing`.
pub async fn set_product_error_with_retry(
    api: &dyn ProductionApi,
    product_id: &str,
    order_id: &str,
    processing_location: &str,
    log_contents: &str,
) -> bool {
    let mut attempt = 0;
    let mut sleep_seconds = DEFAULT_SLEEP_SECONDS as f64;

    loop {
        match api
            .set_product_error(product_id, order_id, processing_location, log_contents)
            .await
        {
            Ok(()) => return true,
            Err(e) => {
                error!("Failed API call to set_product_error: {e}");

                if attempt < MAX_SET_PRODUCT_ERROR_ATTEMPTS {
                    warn!(
                        "Retrying set_product_error in {:.0} seconds (attempt {} of {})",
                        sleep_seconds,
                        attempt + 1,
                        MAX_SET_PRODUCT_ERROR_ATTEMPTS
                    );
                    tokio::time::sleep(Duration::from_secs_f64(sleep_seconds)).await;
                    attempt += 1;
                    sleep_seconds *= SLEEP_GROWTH_FACTOR;
                    continue;
                }

                return false;
            }
        }
    }
}

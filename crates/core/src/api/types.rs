use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::request::ProcessingRequest;

/// Error type for production API operations.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Received unexpected status code: {code} for URL: {url}")]
    UnexpectedStatus { code: u16, url: String },

    #[error("Malformed API response: {0}")]
    MalformedResponse(String),

    #[error("API error: {0}")]
    Other(String),
}

/// A product queued by the selector, identified by order and product ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedProduct {
    pub order_id: String,
    pub product_id: String,
}

/// Client interface to the order-tracking production API.
#[async_trait]
pub trait ProductionApi: Send + Sync {
    /// Probe the base URL; `Ok(true)` on HTTP 200.
    async fn test_connection(&self) -> Result<bool, ApiError>;

    /// Retrieve a configuration value, `None` when the key is undefined.
    async fn get_configuration(&self, key: &str) -> Result<Option<String>, ApiError>;

    /// Retrieve pending products to process. Absent filters are omitted
    /// from the query.
    async fn get_products_to_process(
        &self,
        limit: Option<u32>,
        user: Option<&str>,
        priority: Option<&str>,
        product_types: &[String],
    ) -> Result<Vec<ProcessingRequest>, ApiError>;

    /// Mark the batch queued so it is not selected twice.
    async fn queue_products(
        &self,
        products: &[QueuedProduct],
        module: &str,
        job_name: &str,
    ) -> Result<(), ApiError>;

    /// Update a product's processing status.
    async fn update_status(
        &self,
        product_id: &str,
        order_id: &str,
        processing_location: &str,
        status: &str,
    ) -> Result<(), ApiError>;

    /// Mark a product complete with its destination artifact paths.
    async fn mark_product_complete(
        &self,
        product_id: &str,
        order_id: &str,
        processing_location: &str,
        product_file: &str,
        cksum_file: &str,
    ) -> Result<(), ApiError>;

    /// Report a product failure, shipping the captured log contents.
    async fn set_product_error(
        &self,
        product_id: &str,
        order_id: &str,
        processing_location: &str,
        log_contents: &str,
    ) -> Result<(), ApiError>;

    /// Trigger order finalization and notification handling.
    async fn handle_orders(&self) -> Result<(), ApiError>;

    /// Reset stuck processing statuses.
    async fn reset_status(&self) -> Result<(), ApiError>;
}

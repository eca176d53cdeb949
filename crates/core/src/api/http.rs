//! HTTP implementation of the production API client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::metrics;
use crate::request::ProcessingRequest;

use super::types::{ApiError, ProductionApi, QueuedProduct};

const API_PREFIX: &str = "/production-api/v0";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Production API client over HTTP.
pub struct HttpProductionApi {
    client: Client,
    base: String,
}

impl HttpProductionApi {
    /// Create a client for the given base URL (e.g. `http://host:4004`).
    pub fn new(base_url: &str) -> Self {
        Self::with_timeout(base_url, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            base: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, resource: &str) -> String {
        if resource.starts_with('/') {
            format!("{}{}", self.base, resource)
        } else {
            format!("{}/{}", self.base, resource)
        }
    }

    fn map_error(e: reqwest::Error) -> ApiError {
        if e.is_timeout() {
            ApiError::Timeout
        } else if e.is_connect() {
            ApiError::ConnectionFailed(e.to_string())
        } else {
            ApiError::Other(e.to_string())
        }
    }

    async fn get_json(&self, resource: &str, operation: &str) -> Result<Value, ApiError> {
        let url = self.url(resource);
        debug!("GET {url}");

        let response = self.client.get(&url).send().await.map_err(|e| {
            metrics::API_REQUESTS.with_label_values(&[operation, "error"]).inc();
            Self::map_error(e)
        })?;

        let status = response.status();
        if !status.is_success() {
            metrics::API_REQUESTS.with_label_values(&[operation, "error"]).inc();
            return Err(ApiError::UnexpectedStatus {
                code: status.as_u16(),
                url,
            });
        }

        metrics::API_REQUESTS.with_label_values(&[operation, "success"]).inc();
        response
            .json()
            .await
            .map_err(|e| ApiError::MalformedResponse(e.to_string()))
    }

    async fn post_json<T: Serialize + Sync>(
        &self,
        resource: &str,
        body: &T,
        operation: &str,
    ) -> Result<(), ApiError> {
        let url = self.url(resource);
        debug!("POST {url}");

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                metrics::API_REQUESTS.with_label_values(&[operation, "error"]).inc();
                Self::map_error(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            metrics::API_REQUESTS.with_label_values(&[operation, "error"]).inc();
            return Err(ApiError::UnexpectedStatus {
                code: status.as_u16(),
                url,
            });
        }

        metrics::API_REQUESTS.with_label_values(&[operation, "success"]).inc();
        Ok(())
    }
}

#[async_trait]
impl ProductionApi for HttpProductionApi {
    async fn test_connection(&self) -> Result<bool, ApiError> {
        let response = self
            .client
            .get(&self.base)
            .send()
            .await
            .map_err(Self::map_error)?;

        Ok(response.status().as_u16() == 200)
    }

    async fn get_configuration(&self, key: &str) -> Result<Option<String>, ApiError> {
        let resource = format!("/configuration/{}", urlencoding::encode(key));
        let value = self.get_json(&resource, "get_configuration").await?;

        Ok(value
            .get(key)
            .and_then(|v| v.as_str())
            .map(|s| s.to_string()))
    }

    async fn get_products_to_process(
        &self,
        limit: Option<u32>,
        user: Option<&str>,
        priority: Option<&str>,
        product_types: &[String],
    ) -> Result<Vec<ProcessingRequest>, ApiError> {
        let mut params = Vec::new();
        if let Some(limit) = limit {
            params.push(format!("record_limit={limit}"));
        }
        if let Some(user) = user {
            params.push(format!("for_user={}", urlencoding::encode(user)));
        }
        if let Some(priority) = priority {
            params.push(format!("request_priority={}", urlencoding::encode(priority)));
        }
        if !product_types.is_empty() {
            let joined = product_types.join(",");
            params.push(format!("product_types={}", urlencoding::encode(&joined)));
        }

        let resource = format!("{API_PREFIX}/products?{}", params.join("&"));
        let value = self.get_json(&resource, "get_products_to_process").await?;

        serde_json::from_value(value).map_err(|e| ApiError::MalformedResponse(e.to_string()))
    }

    async fn queue_products(
        &self,
        products: &[QueuedProduct],
        module: &str,
        job_name: &str,
    ) -> Result<(), ApiError> {
        let body = serde_json::json!({
            "products": products,
            "module": module,
            "job_name": job_name,
        });

        self.post_json(
            &format!("{API_PREFIX}/queue-products"),
            &body,
            "queue_products",
        )
        .await
    }

    async fn update_status(
        &self,
        product_id: &str,
        order_id: &str,
        processing_location: &str,
        status: &str,
    ) -> Result<(), ApiError> {
        let body = serde_json::json!({
            "product_id": product_id,
            "order_id": order_id,
            "processing_location": processing_location,
            "status": status,
        });

        self.post_json(
            &format!("{API_PREFIX}/update-status"),
            &body,
            "update_status",
        )
        .await
    }

    async fn mark_product_complete(
        &self,
        product_id: &str,
        order_id: &str,
        processing_location: &str,
        product_file: &str,
        cksum_file: &str,
    ) -> Result<(), ApiError> {
        let body = serde_json::json!({
            "product_id": product_id,
            "order_id": order_id,
            "processing_location": processing_location,
            "completed_file_location": product_file,
            "cksum_file_location": cksum_file,
        });

        self.post_json(
            &format!("{API_PREFIX}/mark-product-complete"),
            &body,
            "mark_product_complete",
        )
        .await
    }

    async fn set_product_error(
        &self,
        product_id: &str,
        order_id: &str,
        processing_location: &str,
        log_contents: &str,
    ) -> Result<(), ApiError> {
        let body = serde_json::json!({
            "product_id": product_id,
            "order_id": order_id,
            "processing_location": processing_location,
            "error_log": log_contents,
        });

        self.post_json(
            &format!("{API_PREFIX}/set-product-error"),
            &body,
            "set_product_error",
        )
        .await
    }

    async fn handle_orders(&self) -> Result<(), ApiError> {
        self.get_json(&format!("{API_PREFIX}/handle-orders"), "handle_orders")
            .await
            .map(|_| ())
    }

    async fn reset_status(&self) -> Result<(), ApiError> {
        self.get_json(&format!("{API_PREFIX}/reset-status"), "reset_status")
            .await
            .map(|_| ())
    }
}

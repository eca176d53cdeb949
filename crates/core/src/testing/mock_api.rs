//! Mock production API.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::api::{ApiError, ProductionApi, QueuedProduct};
use crate::request::ProcessingRequest;

/// A recorded `update_status` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub product_id: String,
    pub order_id: String,
    pub processing_location: String,
    pub status: String,
}

/// A recorded `mark_product_complete` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionCall {
    pub product_id: String,
    pub order_id: String,
    pub product_file: String,
    pub cksum_file: String,
}

/// A recorded `set_product_error` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorCall {
    pub product_id: String,
    pub order_id: String,
    pub log_contents: String,
}

/// A recorded `queue_products` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueCall {
    pub products: Vec<QueuedProduct>,
    pub module: String,
    pub job_name: String,
}

/// A recorded `get_products_to_process` query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductQuery {
    pub limit: Option<u32>,
    pub user: Option<String>,
    pub priority: Option<String>,
    pub product_types: Vec<String>,
}

/// Mock implementation of [`ProductionApi`].
#[derive(Default)]
pub struct MockProductionApi {
    connection_ok: AtomicBool,
    configuration: Arc<RwLock<HashMap<String, String>>>,
    pending: Arc<RwLock<Vec<ProcessingRequest>>>,

    queries: Arc<RwLock<Vec<ProductQuery>>>,
    queue_calls: Arc<RwLock<Vec<QueueCall>>>,
    status_updates: Arc<RwLock<Vec<StatusUpdate>>>,
    completions: Arc<RwLock<Vec<CompletionCall>>>,
    errors: Arc<RwLock<Vec<ErrorCall>>>,
    handle_orders_count: AtomicUsize,
    reset_status_count: AtomicUsize,

    fail_set_product_error: AtomicUsize,
    fail_update_status: AtomicBool,
}

impl MockProductionApi {
    pub fn new() -> Self {
        let api = Self::default();
        api.connection_ok.store(true, Ordering::SeqCst);
        api
    }

    pub fn set_connection_ok(&self, ok: bool) {
        self.connection_ok.store(ok, Ordering::SeqCst);
    }

    pub async fn set_configuration(&self, key: &str, value: &str) {
        self.configuration
            .write()
            .await
            .insert(key.to_string(), value.to_string());
    }

    /// Seed the standard configuration a healthy tracker serves.
    pub async fn with_standard_configuration(self) -> Self {
        self.set_configuration("landsatds.username", "espa-cache").await;
        self.set_configuration("landsatds.password", "cache-secret").await;
        self.set_configuration("landsatds.host", "cache01.example.com").await;
        self.set_configuration("system.ondemand_enabled", "true").await;
        self
    }

    pub async fn set_pending(&self, requests: Vec<ProcessingRequest>) {
        *self.pending.write().await = requests;
    }

    /// Fail the next `count` calls to `set_product_error`.
    pub fn fail_set_product_error_times(&self, count: usize) {
        self.fail_set_product_error.store(count, Ordering::SeqCst);
    }

    pub fn fail_update_status(&self, fail: bool) {
        self.fail_update_status.store(fail, Ordering::SeqCst);
    }

    pub async fn queries(&self) -> Vec<ProductQuery> {
        self.queries.read().await.clone()
    }

    pub async fn queue_calls(&self) -> Vec<QueueCall> {
        self.queue_calls.read().await.clone()
    }

    pub async fn status_updates(&self) -> Vec<StatusUpdate> {
        self.status_updates.read().await.clone()
    }

    pub async fn completions(&self) -> Vec<CompletionCall> {
        self.completions.read().await.clone()
    }

    pub async fn set_product_error_calls(&self) -> Vec<ErrorCall> {
        self.errors.read().await.clone()
    }

    pub fn handle_orders_count(&self) -> usize {
        self.handle_orders_count.load(Ordering::SeqCst)
    }

    pub fn reset_status_count(&self) -> usize {
        self.reset_status_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProductionApi for MockProductionApi {
    async fn test_connection(&self) -> Result<bool, ApiError> {
        Ok(self.connection_ok.load(Ordering::SeqCst))
    }

    async fn get_configuration(&self, key: &str) -> Result<Option<String>, ApiError> {
        Ok(self.configuration.read().await.get(key).cloned())
    }

    async fn get_products_to_process(
        &self,
        limit: Option<u32>,
        user: Option<&str>,
        priority: Option<&str>,
        product_types: &[String],
    ) -> Result<Vec<ProcessingRequest>, ApiError> {
        self.queries.write().await.push(ProductQuery {
            limit,
            user: user.map(String::from),
            priority: priority.map(String::from),
            product_types: product_types.to_vec(),
        });

        let pending = self.pending.read().await;
        let take = limit.map(|l| l as usize).unwrap_or(pending.len());
        Ok(pending.iter().take(take).cloned().collect())
    }

    async fn queue_products(
        &self,
        products: &[QueuedProduct],
        module: &str,
        job_name: &str,
    ) -> Result<(), ApiError> {
        self.queue_calls.write().await.push(QueueCall {
            products: products.to_vec(),
            module: module.to_string(),
            job_name: job_name.to_string(),
        });
        Ok(())
    }

    async fn update_status(
        &self,
        product_id: &str,
        order_id: &str,
        processing_location: &str,
        status: &str,
    ) -> Result<(), ApiError> {
        if self.fail_update_status.load(Ordering::SeqCst) {
            return Err(ApiError::Other("mock update_status failure".to_string()));
        }
        self.status_updates.write().await.push(StatusUpdate {
            product_id: product_id.to_string(),
            order_id: order_id.to_string(),
            processing_location: processing_location.to_string(),
            status: status.to_string(),
        });
        Ok(())
    }

    async fn mark_product_complete(
        &self,
        product_id: &str,
        order_id: &str,
        _processing_location: &str,
        product_file: &str,
        cksum_file: &str,
    ) -> Result<(), ApiError> {
        self.completions.write().await.push(CompletionCall {
            product_id: product_id.to_string(),
            order_id: order_id.to_string(),
            product_file: product_file.to_string(),
            cksum_file: cksum_file.to_string(),
        });
        Ok(())
    }

    async fn set_product_error(
        &self,
        product_id: &str,
        order_id: &str,
        _processing_location: &str,
        log_contents: &str,
    ) -> Result<(), ApiError> {
        self.errors.write().await.push(ErrorCall {
            product_id: product_id.to_string(),
            order_id: order_id.to_string(),
            log_contents: log_contents.to_string(),
        });

        let remaining = self.fail_set_product_error.load(Ordering::SeqCst);
        if remaining > 0 {
            if remaining != usize::MAX {
                self.fail_set_product_error
                    .store(remaining - 1, Ordering::SeqCst);
            }
            return Err(ApiError::Other("mock set_product_error failure".to_string()));
        }

        Ok(())
    }

    async fn handle_orders(&self) -> Result<(), ApiError> {
        self.handle_orders_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn reset_status(&self) -> Result<(), ApiError> {
        self.reset_status_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

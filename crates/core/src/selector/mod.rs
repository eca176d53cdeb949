//! Pending work selection.
//!
//! One selection pass queries the production API for requests that need
//! processing, injects the API URL and cache credentials into each, emits
//! them as JSON lines for the mapper, and marks the batch queued so the
//! next pass does not pick them up again.

use std::fmt;
use std::str::FromStr;

use chrono::Local;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{info, warn};

use crate::api::{ApiError, ProductionApi, QueuedProduct};
use crate::config::{CronConfig, ProcessingConfig};
use crate::metrics;
use crate::request::PLOT_PRODUCT_TYPE;

/// Module name reported to the API when queueing products.
const QUEUE_MODULE: &str = "ondemand cron driver";

/// Request priorities. `All` selects regardless of priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    All,
    Low,
    Normal,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::All => "all",
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
        }
    }

    /// The priority filter sent to the API; `All` means no filter.
    pub fn request_priority(&self) -> Option<&'static str> {
        match self {
            Priority::All => None,
            other => Some(other.as_str()),
        }
    }

    pub const ALL: [Priority; 4] = [Priority::All, Priority::Low, Priority::Normal, Priority::High];
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(Priority::All),
            "low" => Ok(Priority::Low),
            "normal" => Ok(Priority::Normal),
            "high" => Ok(Priority::High),
            other => Err(format!(
                "invalid priority [{other}]: must be one of [all, low, normal, high]"
            )),
        }
    }
}

/// Options for one selection pass.
#[derive(Debug, Clone)]
pub struct SelectorOptions {
    pub priority: Priority,
    pub limit: u32,
    pub user: Option<String>,
    pub product_types: Vec<String>,
}

impl Default for SelectorOptions {
    fn default() -> Self {
        Self {
            priority: Priority::All,
            limit: 500,
            user: None,
            product_types: vec![],
        }
    }
}

/// Error type for the selection pass.
#[derive(Debug, thiserror::Error)]
pub enum SelectorError {
    #[error("Invalid --product-types: {0}")]
    InvalidProductTypes(String),

    #[error("The production API did not respond")]
    ApiUnavailable,

    #[error("{0} is not defined")]
    MissingConfiguration(String),

    #[error("On-demand processing is disabled")]
    Disabled,

    #[error("priority [{0}] not found in configuration")]
    UnknownQueue(String),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Validate the product type combination.
///
/// Plot requests summarize an entire order and are handled by a separate
/// tier; they cannot ride along with scene product types.
pub fn validate_product_types(product_types: &[String]) -> Result<(), SelectorError> {
    if product_types.is_empty() {
        return Err(SelectorError::InvalidProductTypes(
            "at least one product type is required".to_string(),
        ));
    }

    let has_plot = product_types.iter().any(|t| t == PLOT_PRODUCT_TYPE);
    if has_plot && product_types.len() > 1 {
        return Err(SelectorError::InvalidProductTypes(
            "[plot] cannot be combined with any other product types".to_string(),
        ));
    }

    Ok(())
}

/// Count product directories currently in flight under the work directory.
async fn count_in_flight(config: &ProcessingConfig) -> usize {
    let base = config.base_work_dir();
    let mut count = 0;

    if let Ok(mut entries) = tokio::fs::read_dir(&base).await {
        while let Ok(Some(entry)) = entries.next_entry().await {
            if entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
                count += 1;
            }
        }
    }

    count
}

/// Generated job name for one selection batch.
fn job_name(priority: Priority) -> String {
    format!(
        "{}-{}-espa_job",
        Local::now().format("%Y-%m-%d-%H-%M-%S"),
        priority.as_str()
    )
}

/// Run one selection pass, writing one JSON request per line to `out`.
///
/// Returns the number of requests emitted.
pub async fn run_selection<W>(
    api: &dyn ProductionApi,
    cron_cfg: &CronConfig,
    proc_cfg: &ProcessingConfig,
    opts: &SelectorOptions,
    out: &mut W,
) -> Result<usize, SelectorError>
where
    W: AsyncWrite + Unpin,
{
    validate_product_types(&opts.product_types)?;

    // The queue mapping must know this priority before any work is pulled.
    let queue = cron_cfg
        .queue_mapping
        .get(opts.priority.as_str())
        .ok_or_else(|| SelectorError::UnknownQueue(opts.priority.to_string()))?;

    // Do not pull new work while the node is saturated.
    let in_flight = count_in_flight(proc_cfg).await;
    if in_flight >= cron_cfg.max_jobs {
        warn!("Detected {in_flight} products processing");
        warn!(
            "No additional products will be selected until the count is below {}",
            cron_cfg.max_jobs
        );
        return Ok(0);
    }

    if !api.test_connection().await? {
        return Err(SelectorError::ApiUnavailable);
    }

    let user = required_configuration(api, "landsatds.username").await?;
    let password = required_configuration(api, "landsatds.password").await?;
    let _cache_host = required_configuration(api, "landsatds.host").await?;

    let enabled = api
        .get_configuration("system.ondemand_enabled")
        .await?
        .unwrap_or_default();
    if !enabled.eq_ignore_ascii_case("true") {
        return Err(SelectorError::Disabled);
    }

    info!("Checking for requests to process...");
    let requests = api
        .get_products_to_process(
            Some(opts.limit),
            opts.user.as_deref(),
            opts.priority.request_priority(),
            &opts.product_types,
        )
        .await?;

    if requests.is_empty() {
        info!("No requests to process....");
        metrics::PRODUCTS_SELECTED.with_label_values(&[]).observe(0.0);
        return Ok(0);
    }

    let job_name = job_name(opts.priority);
    info!("Found requests to process, generating job name: {job_name} (queue {queue})");

    let mut queued = Vec::with_capacity(requests.len());
    for request in requests.iter() {
        let mut request = request.clone();
        request.espa_api = Some(proc_cfg.api.clone());

        // Log the request before credentials are added.
        if let Ok(line) = serde_json::to_string(&request.sanitized()) {
            info!("{line}");
        }

        request.options.source_username = Some(user.clone());
        request.options.destination_username = Some(user.clone());
        request.options.source_pw = Some(password.clone());
        request.options.destination_pw = Some(password.clone());

        let line = serde_json::to_string(&request)
            .map_err(|e| ApiError::MalformedResponse(e.to_string()))?;
        out.write_all(line.as_bytes()).await?;
        out.write_all(b"\n").await?;

        queued.push(QueuedProduct {
            order_id: request.orderid.clone(),
            product_id: request.effective_product_id().to_string(),
        });
        info!(
            "Adding product:{} orderid:{} to queued list",
            request.scene, request.orderid
        );
    }
    out.flush().await?;

    api.queue_products(&queued, QUEUE_MODULE, &job_name).await?;

    metrics::PRODUCTS_SELECTED
        .with_label_values(&[])
        .observe(queued.len() as f64);

    Ok(queued.len())
}

async fn required_configuration(
    api: &dyn ProductionApi,
    key: &str,
) -> Result<String, SelectorError> {
    api.get_configuration(key)
        .await?
        .filter(|v| !v.is_empty())
        .ok_or_else(|| SelectorError::MissingConfiguration(key.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DistributionMethod;
    use crate::request::{OrderOptions, ProcessingRequest};
    use crate::testing::MockProductionApi;
    use std::path::PathBuf;

    fn processing_config(work_dir: PathBuf) -> ProcessingConfig {
        ProcessingConfig {
            api: "http://localhost:4004".to_string(),
            work_dir,
            distribution_method: DistributionMethod::Local,
            distribution_dir: Some(PathBuf::from("/data/orders")),
            cache_host_list: vec![],
            aux_dir: None,
            immutable_distribution: false,
            include_resource_report: false,
            min_request_duration: 5,
        }
    }

    fn request(order: &str, scene: &str) -> ProcessingRequest {
        ProcessingRequest {
            orderid: order.to_string(),
            scene: scene.to_string(),
            product_id: None,
            product_type: "landsat".to_string(),
            priority: None,
            download_url: Some("http://cache/scene.tar.gz".to_string()),
            espa_api: None,
            bridge_mode: false,
            options: OrderOptions::default(),
        }
    }

    fn selector_options() -> SelectorOptions {
        SelectorOptions {
            priority: Priority::All,
            limit: 10,
            user: None,
            product_types: vec!["landsat".to_string()],
        }
    }

    #[test]
    fn test_priority_round_trip() {
        for priority in Priority::ALL {
            assert_eq!(
                Priority::from_str(priority.as_str()).unwrap(),
                priority
            );
        }
        assert!(Priority::from_str("urgent").is_err());
        assert_eq!(Priority::All.request_priority(), None);
        assert_eq!(Priority::High.request_priority(), Some("high"));
    }

    #[test]
    fn test_plot_cannot_be_combined() {
        let ok = vec!["plot".to_string()];
        assert!(validate_product_types(&ok).is_ok());

        let bad = vec!["landsat".to_string(), "plot".to_string()];
        assert!(matches!(
            validate_product_types(&bad),
            Err(SelectorError::InvalidProductTypes(_))
        ));

        assert!(validate_product_types(&[]).is_err());
    }

    #[tokio::test]
    async fn test_selection_emits_lines_and_queues() {
        let dir = tempfile::tempdir().unwrap();
        let api = MockProductionApi::new().with_standard_configuration().await;
        api.set_pending(vec![
            request("o1", "LT05_L1TP_038038_19950624_20160302_01_T1"),
            request("o2", "LE07_L1TP_022033_20140228_20161028_01_T1"),
        ])
        .await;

        let mut out = Vec::new();
        let count = run_selection(
            &api,
            &CronConfig::default(),
            &processing_config(dir.path().to_path_buf()),
            &selector_options(),
            &mut out,
        )
        .await
        .unwrap();

        assert_eq!(count, 2);

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);

        // Each line is a standalone JSON request with the API URL and
        // credentials injected.
        let parsed: ProcessingRequest = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed.espa_api.as_deref(), Some("http://localhost:4004"));
        assert_eq!(parsed.options.source_username.as_deref(), Some("espa-cache"));
        assert_eq!(parsed.options.source_pw.as_deref(), Some("cache-secret"));

        // The batch was marked queued with the generated job name.
        let queue_calls = api.queue_calls().await;
        assert_eq!(queue_calls.len(), 1);
        assert_eq!(queue_calls[0].module, QUEUE_MODULE);
        assert!(queue_calls[0].job_name.ends_with("-all-espa_job"));
        assert_eq!(queue_calls[0].products.len(), 2);
        assert_eq!(queue_calls[0].products[0].order_id, "o1");
    }

    #[tokio::test]
    async fn test_selection_passes_filters_to_api() {
        let dir = tempfile::tempdir().unwrap();
        let api = MockProductionApi::new().with_standard_configuration().await;

        let opts = SelectorOptions {
            priority: Priority::High,
            limit: 25,
            user: Some("someone".to_string()),
            product_types: vec!["landsat".to_string(), "modis".to_string()],
        };

        let mut out = Vec::new();
        run_selection(
            &api,
            &CronConfig::default(),
            &processing_config(dir.path().to_path_buf()),
            &opts,
            &mut out,
        )
        .await
        .unwrap();

        let queries = api.queries().await;
        assert_eq!(queries.len(), 1);
        assert_eq!(queries[0].limit, Some(25));
        assert_eq!(queries[0].user.as_deref(), Some("someone"));
        assert_eq!(queries[0].priority.as_deref(), Some("high"));
        assert_eq!(queries[0].product_types, vec!["landsat", "modis"]);
    }

    #[tokio::test]
    async fn test_all_priority_sends_no_filter() {
        let dir = tempfile::tempdir().unwrap();
        let api = MockProductionApi::new().with_standard_configuration().await;

        let mut out = Vec::new();
        run_selection(
            &api,
            &CronConfig::default(),
            &processing_config(dir.path().to_path_buf()),
            &selector_options(),
            &mut out,
        )
        .await
        .unwrap();

        assert_eq!(api.queries().await[0].priority, None);
    }

    #[tokio::test]
    async fn test_disabled_system_refuses() {
        let dir = tempfile::tempdir().unwrap();
        let api = MockProductionApi::new().with_standard_configuration().await;
        api.set_configuration("system.ondemand_enabled", "false").await;

        let mut out = Vec::new();
        let err = run_selection(
            &api,
            &CronConfig::default(),
            &processing_config(dir.path().to_path_buf()),
            &selector_options(),
            &mut out,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, SelectorError::Disabled));
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_missing_credentials_refuses() {
        let dir = tempfile::tempdir().unwrap();
        let api = MockProductionApi::new();
        api.set_configuration("system.ondemand_enabled", "true").await;

        let mut out = Vec::new();
        let err = run_selection(
            &api,
            &CronConfig::default(),
            &processing_config(dir.path().to_path_buf()),
            &selector_options(),
            &mut out,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, SelectorError::MissingConfiguration(k) if k == "landsatds.username"));
    }

    #[tokio::test]
    async fn test_saturated_node_selects_nothing() {
        let dir = tempfile::tempdir().unwrap();
        // Two in-flight product directories against max_jobs = 2.
        tokio::fs::create_dir(dir.path().join("o1-p1")).await.unwrap();
        tokio::fs::create_dir(dir.path().join("o2-p2")).await.unwrap();

        let api = MockProductionApi::new().with_standard_configuration().await;
        api.set_pending(vec![request("o3", "LT05_L1TP_038038_19950624_20160302_01_T1")])
            .await;

        let cron_cfg = CronConfig {
            max_jobs: 2,
            ..Default::default()
        };

        let mut out = Vec::new();
        let count = run_selection(
            &api,
            &cron_cfg,
            &processing_config(dir.path().to_path_buf()),
            &selector_options(),
            &mut out,
        )
        .await
        .unwrap();

        assert_eq!(count, 0);
        assert!(out.is_empty());
        assert!(api.queries().await.is_empty());
    }

    #[tokio::test]
    async fn test_no_pending_work_is_clean() {
        let dir = tempfile::tempdir().unwrap();
        let api = MockProductionApi::new().with_standard_configuration().await;

        let mut out = Vec::new();
        let count = run_selection(
            &api,
            &CronConfig::default(),
            &processing_config(dir.path().to_path_buf()),
            &selector_options(),
            &mut out,
        )
        .await
        .unwrap();

        assert_eq!(count, 0);
        assert!(api.queue_calls().await.is_empty());
    }
}

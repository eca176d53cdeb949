//! The on-demand mapper.
//!
//! Reads one JSON request per stdin line and drives each through the
//! product processor, reporting status transitions to the production API.
//! A failing product never stops the loop and the mapper always exits
//! cleanly; failures are reported through the API with the captured job
//! log.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{error, info, warn};

use crate::api::{set_product_error_with_retry, HttpProductionApi, ProductionApi};
use crate::command::{CommandRunner, ShellRunner};
use crate::config::ProcessingConfig;
use crate::joblog::{self, create_job_log, job_log_path};
use crate::processor::ProductProcessor;
use crate::request::{OutputFormat, ProcessingRequest, PLOT_PRODUCT_TYPE};
use crate::sensor;

/// Builds an API client for the URL a request carries.
pub type ApiFactory = Arc<dyn Fn(&str) -> Arc<dyn ProductionApi> + Send + Sync>;

/// Where this mapper reports processing from.
pub fn processing_location() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string())
}

/// Everything one mapper run needs.
pub struct MapperContext {
    pub config: ProcessingConfig,
    pub log_dir: PathBuf,
    /// Developer mode skips request pacing and keeps product directories.
    pub developer: bool,
    pub runner: Arc<dyn CommandRunner>,
    pub api_factory: ApiFactory,
    pub processing_location: String,
}

impl MapperContext {
    pub fn new(config: ProcessingConfig, log_dir: PathBuf) -> Self {
        Self {
            config,
            log_dir,
            developer: false,
            runner: Arc::new(ShellRunner::new()),
            api_factory: Arc::new(|url: &str| {
                Arc::new(HttpProductionApi::new(url)) as Arc<dyn ProductionApi>
            }),
            processing_location: processing_location(),
        }
    }

    pub fn with_developer_mode(mut self, developer: bool) -> Self {
        self.developer = developer;
        self
    }

    pub fn with_runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.runner = runner;
        self
    }

    pub fn with_api_factory(mut self, factory: ApiFactory) -> Self {
        self.api_factory = factory;
        self
    }
}

/// Read requests from `reader` until end of input. Returns the number of
/// request lines dispatched.
pub async fn run_mapper<R>(reader: R, ctx: &MapperContext) -> u64
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut dispatched = 0;

    while let Some(line) = lines.next_line().await.unwrap_or(None) {
        // Dispatch framing may prefix lines with counters; the request
        // starts at the first opening brace.
        let Some(start) = line.find('{') else {
            continue;
        };
        let line = line[start..].trim().replace('#', "");
        if line.is_empty() {
            continue;
        }

        dispatched += 1;
        process_line(ctx, &line).await;
    }

    dispatched
}

/// Process one request line end to end. Never propagates an error; the
/// failure path reports through the API instead.
async fn process_line(ctx: &MapperContext, line: &str) {
    let mut request: ProcessingRequest = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(e) => {
            error!("Dropping malformed request line: {e}");
            return;
        }
    };

    // Single quotes break the command lines the processors build.
    request.orderid = request.orderid.replace('\'', "");
    if request.product_id.is_none() {
        request.product_id = Some(request.scene.clone());
    }

    let order_id = request.orderid.clone();
    let product_id = request.effective_product_id().to_string();

    let log_path = job_log_path(&ctx.log_dir, &order_id, &product_id);
    let (joblog, writer) = create_job_log(log_path.clone(), request.options.debug);
    let writer = tokio::spawn(writer.run());

    let api: Option<Arc<dyn ProductionApi>> = if request.skips_api() {
        None
    } else {
        request.espa_api.as_deref().map(|url| (ctx.api_factory)(url))
    };

    info!("Processing {order_id}:{product_id}");
    joblog
        .info(format!("Processing {order_id}:{product_id}"))
        .await;

    if let Some(api) = &api {
        if let Err(e) = api
            .update_status(
                &product_id,
                &order_id,
                &ctx.processing_location,
                "processing",
            )
            .await
        {
            warn!("Failed API call to update_status to processing: {e}");
        }
    }

    let start = Instant::now();

    let result = {
        let processor = ProductProcessor::new(
            ctx.config.clone(),
            Arc::clone(&ctx.runner),
            joblog.clone(),
        )
        .with_developer_mode(ctx.developer);

        run_product(&processor, &mut request, &joblog).await
    };

    // Pace short requests so the order tracker sees sane intervals.
    if !ctx.developer {
        let elapsed = start.elapsed();
        info!("Processing time elapsed {} seconds", elapsed.as_secs());
        let minimum = Duration::from_secs(ctx.config.min_request_duration.max(1));
        let pause = minimum.saturating_sub(elapsed).max(Duration::from_secs(1));
        info!("Sleeping an additional {} seconds", pause.as_secs());
        tokio::time::sleep(pause).await;
    }

    // Close the log before reading it back or archiving it.
    drop(joblog);
    let _ = writer.await;

    if let Some(distribution_dir) = &ctx.config.distribution_dir {
        if let Err(e) = joblog::archive(&log_path, distribution_dir, &order_id).await {
            // End-of-processing housekeeping never fails the product.
            warn!("Failed to archive job log: {e}");
        }
    }

    match result {
        Ok(distributed) => {
            if let Some(api) = &api {
                if let Err(e) = api
                    .mark_product_complete(
                        &product_id,
                        &order_id,
                        &ctx.processing_location,
                        &distributed.product_file,
                        &distributed.cksum_file,
                    )
                    .await
                {
                    warn!("Failed API call to mark_product_complete: {e}");
                }
            }
        }
        Err(e) => {
            error!("Processing failed for {order_id}:{product_id}: {e}");

            if let Some(api) = &api {
                let log_contents = joblog::read_contents(&log_path)
                    .await
                    .unwrap_or_else(|_| format!("log unavailable: {e}"));

                let ok = set_product_error_with_retry(
                    api.as_ref(),
                    &product_id,
                    &order_id,
                    &ctx.processing_location,
                    &log_contents,
                )
                .await;
                if !ok {
                    error!("Failed to report product error for {order_id}:{product_id}");
                }
            }
        }
    }
}

async fn run_product(
    processor: &ProductProcessor,
    request: &mut ProcessingRequest,
    joblog: &crate::joblog::JobLogHandle,
) -> Result<crate::distribution::DistributedProduct, crate::processor::ProcessorError> {
    if request.product_type == PLOT_PRODUCT_TYPE {
        joblog
            .error("plot requests are handled by the statistics tier")
            .await;
        return Err(sensor::SensorError::NotSupported(PLOT_PRODUCT_TYPE.to_string()).into());
    }

    // Reject unsupported products before any staging work happens.
    let _ = sensor::info(request.effective_product_id())?;

    if request.options.output_format.is_none() {
        joblog
            .warning("'output_format' parameter missing defaulting to envi")
            .await;
        request.options.output_format = Some(OutputFormat::Envi);
    }

    processor.process(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DistributionMethod;
    use crate::request::OrderOptions;
    use crate::testing::{MockCommandRunner, MockProductionApi};
    use std::io::Cursor;

    fn context(dir: &std::path::Path, api: Arc<MockProductionApi>) -> MapperContext {
        let config = ProcessingConfig {
            api: "http://localhost:4004".to_string(),
            work_dir: dir.join("work-root"),
            distribution_method: DistributionMethod::Local,
            distribution_dir: Some(dir.join("cache")),
            cache_host_list: vec![],
            aux_dir: None,
            immutable_distribution: false,
            include_resource_report: false,
            min_request_duration: 1,
        };

        MapperContext::new(config, dir.to_path_buf())
            .with_developer_mode(true)
            .with_runner(Arc::new(MockCommandRunner::new()))
            .with_api_factory(Arc::new(move |_url: &str| {
                Arc::clone(&api) as Arc<dyn ProductionApi>
            }))
    }

    fn request_line(order: &str, scene: &str) -> String {
        let request = ProcessingRequest {
            orderid: order.to_string(),
            scene: scene.to_string(),
            product_id: None,
            product_type: "landsat".to_string(),
            priority: None,
            download_url: None,
            espa_api: Some("http://localhost:4004".to_string()),
            bridge_mode: false,
            options: OrderOptions::default(),
        };
        serde_json::to_string(&request).unwrap()
    }

    #[tokio::test]
    async fn test_skips_lines_without_json() {
        let dir = tempfile::tempdir().unwrap();
        let api = Arc::new(MockProductionApi::new());
        let ctx = context(dir.path(), Arc::clone(&api));

        let input = "garbage\n\nanother line\n";
        let dispatched = run_mapper(Cursor::new(input), &ctx).await;
        assert_eq!(dispatched, 0);
    }

    #[tokio::test]
    async fn test_unsupported_product_reports_error_with_log() {
        let dir = tempfile::tempdir().unwrap();
        let api = Arc::new(MockProductionApi::new());
        let ctx = context(dir.path(), Arc::clone(&api));

        let line = request_line("order-1", "NOT_A_PRODUCT");
        run_mapper(Cursor::new(format!("{line}\n")), &ctx).await;

        // Status went to processing first, then the failure was reported
        // with the job log contents.
        let updates = api.status_updates().await;
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].status, "processing");
        assert_eq!(updates[0].product_id, "NOT_A_PRODUCT");

        let errors = api.set_product_error_calls().await;
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].order_id, "order-1");
        assert!(errors[0].log_contents.contains("Processing order-1:NOT_A_PRODUCT"));

        assert!(api.completions().await.is_empty());
    }

    #[tokio::test]
    async fn test_line_prefix_and_quotes_are_cleaned() {
        let dir = tempfile::tempdir().unwrap();
        let api = Arc::new(MockProductionApi::new());
        let ctx = context(dir.path(), Arc::clone(&api));

        // Framing prefixes the JSON with a counter; the order ID carries a
        // stray quote.
        let line = request_line("order'-2", "NOT_A_PRODUCT");
        let framed = format!("341104\t{line}\n");
        run_mapper(Cursor::new(framed), &ctx).await;

        let errors = api.set_product_error_calls().await;
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].order_id, "order-2");
    }

    #[tokio::test]
    async fn test_plot_requests_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let api = Arc::new(MockProductionApi::new());
        let ctx = context(dir.path(), Arc::clone(&api));

        let mut request: ProcessingRequest =
            serde_json::from_str(&request_line("order-3", "plot")).unwrap();
        request.product_type = PLOT_PRODUCT_TYPE.to_string();
        let line = serde_json::to_string(&request).unwrap();

        run_mapper(Cursor::new(format!("{line}\n")), &ctx).await;

        let errors = api.set_product_error_calls().await;
        assert_eq!(errors.len(), 1);
        assert!(errors[0].log_contents.contains("statistics tier"));
    }

    #[tokio::test]
    async fn test_skip_api_sentinel_suppresses_reporting() {
        let dir = tempfile::tempdir().unwrap();
        let api = Arc::new(MockProductionApi::new());
        let ctx = context(dir.path(), Arc::clone(&api));

        let mut request: ProcessingRequest =
            serde_json::from_str(&request_line("order-4", "NOT_A_PRODUCT")).unwrap();
        request.espa_api = Some("skip-api".to_string());
        let line = serde_json::to_string(&request).unwrap();

        run_mapper(Cursor::new(format!("{line}\n")), &ctx).await;

        assert!(api.status_updates().await.is_empty());
        assert!(api.set_product_error_calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_the_loop() {
        let dir = tempfile::tempdir().unwrap();
        let api = Arc::new(MockProductionApi::new());
        let ctx = context(dir.path(), Arc::clone(&api));

        let input = format!(
            "{}\n{}\n",
            request_line("order-5", "NOT_A_PRODUCT"),
            request_line("order-6", "ALSO_NOT_A_PRODUCT"),
        );
        let dispatched = run_mapper(Cursor::new(input), &ctx).await;

        assert_eq!(dispatched, 2);
        assert_eq!(api.set_product_error_calls().await.len(), 2);
    }

    #[tokio::test]
    async fn test_job_log_archived_on_failure() {
        let dir = tempfile::tempdir().unwrap();
        let api = Arc::new(MockProductionApi::new());
        let ctx = context(dir.path(), Arc::clone(&api));

        let line = request_line("order-7", "NOT_A_PRODUCT");
        run_mapper(Cursor::new(format!("{line}\n")), &ctx).await;

        let archived = dir
            .path()
            .join("cache/logs/order-7/espa-order-7-NOT_A_PRODUCT.log");
        assert!(archived.exists());
    }
}

//! Product processing.
//!
//! Drives one product request through staging, science product
//! generation, customization, formatting and distribution. The
//! sensor-specific pieces live behind [`SceneHandler`]; all external tools
//! run through [`CommandRunner`](crate::command::CommandRunner).

mod customize;
mod directories;
mod formatting;
mod landsat;
mod modis;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Local;
use regex_lite::Regex;
use tracing::{info, warn};

use crate::command::{CommandError, CommandRunner};
use crate::config::{DistributionMethod, ProcessingConfig};
use crate::distribution::{
    distribute_product, DistributedProduct, DistributionError, Distributor, LocalDistributor,
    RemoteDistributor,
};
use crate::joblog::JobLogHandle;
use crate::metrics;
use crate::request::{
    validate_customization, OrderOptions, OutputFormat, ProcessingRequest, ValidationError,
};
use crate::sensor::{self, ProductFamily, SensorError, SensorInfo};
use crate::staging::{stage_input, StagingError};

pub use customize::{reprojection_args, REPROJECTION_TOOL};
pub use directories::ProcessingDirectories;
pub use formatting::reformat;
pub use landsat::LandsatHandler;
pub use modis::ModisHandler;

/// Error type for product processing.
#[derive(Debug, thiserror::Error)]
pub enum ProcessorError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Sensor(#[from] SensorError),

    #[error(transparent)]
    Staging(#[from] StagingError),

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error(transparent)]
    Distribution(#[from] DistributionError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Missing metadata: {0}")]
    MissingMetadata(String),
}

/// Everything a scene handler needs to run its tools.
#[derive(Clone)]
pub struct SceneContext {
    pub runner: Arc<dyn CommandRunner>,
    pub joblog: JobLogHandle,
    pub work_dir: PathBuf,
    pub stage_dir: PathBuf,
    pub product_id: String,
    pub options: OrderOptions,
    /// Internal metadata file name, `{product_id}.xml`.
    pub xml_filename: String,
}

impl SceneContext {
    /// Run one science tool in the work directory, logging the command
    /// line and its output to the job log.
    pub async fn run_tool(
        &self,
        label: &str,
        program: &str,
        args: Vec<String>,
    ) -> Result<(), ProcessorError> {
        self.joblog
            .info(format!("{label} COMMAND: {program} {}", args.join(" ")))
            .await;

        match self.runner.run(program, &args, Some(&self.work_dir)).await {
            Ok(output) => {
                if !output.is_empty() {
                    self.joblog.info(output).await;
                }
                Ok(())
            }
            Err(e) => {
                if let Some(output) = e.output() {
                    if !output.is_empty() {
                        self.joblog.info(output.to_string()).await;
                    }
                }
                Err(e.into())
            }
        }
    }

    /// Remove work-directory files matching any of the wildcard patterns.
    pub async fn remove_matching(&self, patterns: &[&str]) -> Result<(), ProcessorError> {
        if patterns.is_empty() {
            return Ok(());
        }

        let mut removed = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.work_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if patterns.iter().any(|p| wildcard_match(p, &name)) {
                tokio::fs::remove_file(entry.path()).await?;
                removed.push(name);
            }
        }

        if !removed.is_empty() {
            self.joblog
                .info(format!("Removed non-product files: {}", removed.join(" ")))
                .await;
        }

        Ok(())
    }
}

/// Shell-style `*` wildcard match against a file name.
pub fn wildcard_match(pattern: &str, name: &str) -> bool {
    let mut regex = String::with_capacity(pattern.len() + 8);
    regex.push('^');
    for ch in pattern.chars() {
        match ch {
            '*' => regex.push_str(".*"),
            c => regex.push_str(&regex_lite::escape(&c.to_string())),
        }
    }
    regex.push('$');

    Regex::new(&regex)
        .map(|re| re.is_match(name))
        .unwrap_or(false)
}

/// Sensor-specific processing steps.
#[async_trait]
pub trait SceneHandler: Send + Sync {
    /// Generate the requested science products in the work directory.
    async fn build_science_products(&self, ctx: &SceneContext) -> Result<(), ProcessorError>;

    /// Remove intermediates and unrequested source data before packaging.
    async fn cleanup_work_dir(&self, ctx: &SceneContext) -> Result<(), ProcessorError>;
}

/// The handler for a product family.
pub fn handler_for(family: ProductFamily) -> Box<dyn SceneHandler> {
    match family {
        ProductFamily::Landsat => Box::new(LandsatHandler),
        ProductFamily::Modis => Box::new(ModisHandler),
    }
}

/// Name a completed product: the sensor prefix plus a generation stamp.
pub fn product_name(info: &SensorInfo) -> String {
    let stamp = Local::now().format("%Y%m%d%H%M%S");
    format!("{}-SC{stamp}", info.product_prefix)
}

/// Processes one product request end to end.
pub struct ProductProcessor {
    config: ProcessingConfig,
    runner: Arc<dyn CommandRunner>,
    client: reqwest::Client,
    joblog: JobLogHandle,
    developer: bool,
}

impl ProductProcessor {
    pub fn new(
        config: ProcessingConfig,
        runner: Arc<dyn CommandRunner>,
        joblog: JobLogHandle,
    ) -> Self {
        Self {
            config,
            runner,
            client: reqwest::Client::new(),
            joblog,
            developer: false,
        }
    }

    /// Developer mode keeps the product directory for inspection.
    pub fn with_developer_mode(mut self, developer: bool) -> Self {
        self.developer = developer;
        self
    }

    /// Process the request and return the destination product and
    /// checksum locations.
    pub async fn process(
        &self,
        request: &mut ProcessingRequest,
    ) -> Result<DistributedProduct, ProcessorError> {
        let sanitized = serde_json::to_string(&request.sanitized()).unwrap_or_default();
        self.joblog
            .info(format!("MAPPER OPTION LINE {sanitized}"))
            .await;

        let product_id = request.effective_product_id().to_string();
        let order_id = request.orderid.clone();

        let info = sensor::info(&product_id)?;
        validate_customization(&mut request.options, &product_id)?;

        let dirs = ProcessingDirectories::create(&self.config, &order_id, &product_id).await?;

        let result = self.process_product(&dirs, request, &info).await;

        if self.config.include_resource_report {
            let snapshot = metrics::ResourceSnapshot::capture(&dirs.work_dir, &order_id, &product_id);
            info!(
                "*** RESOURCE SNAPSHOT {} ***",
                serde_json::to_string(&snapshot).unwrap_or_default()
            );
        }

        // Free the disk whatever happened, unless a developer asked to
        // keep the tree around.
        if !request.options.keep_directory && !self.developer {
            dirs.remove().await;
        } else {
            warn!("Keeping product directory [{}]", dirs.product_dir.display());
        }

        match &result {
            Ok(_) => metrics::PRODUCTS_PROCESSED.with_label_values(&["success"]).inc(),
            Err(_) => metrics::PRODUCTS_PROCESSED.with_label_values(&["failed"]).inc(),
        }

        result
    }

    async fn process_product(
        &self,
        dirs: &ProcessingDirectories,
        request: &ProcessingRequest,
        info: &SensorInfo,
    ) -> Result<DistributedProduct, ProcessorError> {
        let product_id = request.effective_product_id().to_string();

        let ctx = SceneContext {
            runner: Arc::clone(&self.runner),
            joblog: self.joblog.clone(),
            work_dir: dirs.work_dir.clone(),
            stage_dir: dirs.stage_dir.clone(),
            product_id: product_id.clone(),
            options: request.options.clone(),
            xml_filename: format!("{product_id}.xml"),
        };

        let phase = Instant::now();
        stage_input(
            self.runner.as_ref(),
            &self.client,
            &self.joblog,
            &product_id,
            request.download_url.as_deref(),
            info.family,
            &dirs.stage_dir,
            &dirs.work_dir,
        )
        .await?;
        metrics::PROCESSING_DURATION
            .with_label_values(&["stage"])
            .observe(phase.elapsed().as_secs_f64());

        let handler = handler_for(info.family);

        if request.options.has_science_products() {
            let phase = Instant::now();
            handler.build_science_products(&ctx).await?;
            metrics::PROCESSING_DURATION
                .with_label_values(&["science"])
                .observe(phase.elapsed().as_secs_f64());
        } else {
            self.joblog.info("*** NO SCIENCE PRODUCTS CHOSEN ***").await;
        }

        if let Some(args) = reprojection_args(&request.options, &ctx.xml_filename) {
            let phase = Instant::now();
            ctx.run_tool("PRODUCT CUSTOMIZATION", REPROJECTION_TOOL, args)
                .await?;
            metrics::PROCESSING_DURATION
                .with_label_values(&["customize"])
                .observe(phase.elapsed().as_secs_f64());
        }

        handler.cleanup_work_dir(&ctx).await?;

        let phase = Instant::now();
        reformat(
            self.runner.as_ref(),
            &self.joblog,
            &dirs.work_dir,
            &ctx.xml_filename,
            request.options.output_format.unwrap_or(OutputFormat::Envi),
        )
        .await?;
        metrics::PROCESSING_DURATION
            .with_label_values(&["format"])
            .observe(phase.elapsed().as_secs_f64());

        let name = product_name(info);
        let distributor: Box<dyn Distributor> = match self.config.distribution_method {
            DistributionMethod::Local => Box::new(LocalDistributor::new(
                self.config
                    .distribution_dir
                    .clone()
                    .ok_or(DistributionError::NotConfigured(
                        "distribution_dir is required for the local distribution method",
                    ))?,
            )),
            DistributionMethod::Remote => Box::new(RemoteDistributor::new(
                Arc::clone(&self.runner),
                self.config.cache_host_list.clone(),
                self.config.immutable_distribution,
            )),
        };

        let phase = Instant::now();
        let distributed = distribute_product(
            distributor.as_ref(),
            self.runner.as_ref(),
            &dirs.work_dir,
            &dirs.output_dir,
            &name,
            &request.orderid,
        )
        .await?;
        metrics::PROCESSING_DURATION
            .with_label_values(&["distribute"])
            .observe(phase.elapsed().as_secs_f64());

        self.joblog.info("*** Product Delivery Complete ***").await;

        Ok(distributed)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::path::{Path, PathBuf};
    use std::sync::Arc;

    use crate::joblog::{create_job_log, JobLogHandle};
    use crate::request::OrderOptions;
    use crate::testing::{MockCommandRunner, RecordedCommand};

    use super::SceneContext;

    /// Fixture wiring a [`SceneContext`] over temp directories and mocks.
    pub(crate) struct SceneFixture {
        _dir: tempfile::TempDir,
        work_dir: PathBuf,
        stage_dir: PathBuf,
        runner: Arc<MockCommandRunner>,
        joblog: JobLogHandle,
        _writer: tokio::task::JoinHandle<()>,
        product_id: String,
        options: OrderOptions,
    }

    pub(crate) async fn scene_fixture(product_id: &str, options: OrderOptions) -> SceneFixture {
        let dir = tempfile::tempdir().unwrap();
        let work_dir = dir.path().join("work");
        let stage_dir = dir.path().join("stage");
        tokio::fs::create_dir_all(&work_dir).await.unwrap();
        tokio::fs::create_dir_all(&stage_dir).await.unwrap();

        let (joblog, writer) = create_job_log(dir.path().join("espa-test.log"), false);
        let writer = tokio::spawn(writer.run());

        SceneFixture {
            work_dir,
            stage_dir,
            runner: Arc::new(MockCommandRunner::new()),
            joblog,
            _writer: writer,
            product_id: product_id.to_string(),
            options,
            _dir: dir,
        }
    }

    impl SceneFixture {
        pub(crate) fn work_dir(&self) -> &Path {
            &self.work_dir
        }

        pub(crate) fn context(&self) -> SceneContext {
            SceneContext {
                runner: self.runner.clone(),
                joblog: self.joblog.clone(),
                work_dir: self.work_dir.clone(),
                stage_dir: self.stage_dir.clone(),
                product_id: self.product_id.clone(),
                options: self.options.clone(),
                xml_filename: format!("{}.xml", self.product_id),
            }
        }

        pub(crate) async fn recorded(&self) -> Vec<RecordedCommand> {
            self.runner.recorded().await
        }

        pub(crate) async fn recorded_programs(&self) -> Vec<String> {
            self.runner
                .recorded()
                .await
                .into_iter()
                .map(|c| c.program)
                .collect()
        }
    }
}

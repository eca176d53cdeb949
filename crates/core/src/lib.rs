pub mod api;
pub mod command;
pub mod config;
pub mod dispatch;
pub mod distribution;
pub mod joblog;
pub mod mapper;
pub mod metrics;
pub mod processor;
pub mod request;
pub mod selector;
pub mod sensor;
pub mod staging;
pub mod testing;

pub use api::{
    set_product_error_with_retry, ApiError, HttpProductionApi, ProductionApi, QueuedProduct,
};
pub use command::{CommandError, CommandRunner, ShellRunner};
pub use config::{
    load_cron_config, load_processing_config, validate_processing_config, ConfigError, CronConfig,
    DistributionMethod, ProcessingConfig,
};
pub use dispatch::{run_pass, DispatchConfig, DispatchError, PassSummary};
pub use joblog::{create_job_log, JobLogHandle, JobLogWriter};
pub use mapper::{run_mapper, ApiFactory, MapperContext};
pub use processor::{ProcessorError, ProductProcessor};
pub use request::{OrderOptions, OutputFormat, ProcessingRequest, ValidationError};
pub use selector::{run_selection, Priority, SelectorError, SelectorOptions};
pub use sensor::{ProductFamily, SensorError, SensorInfo};

//! Mock implementations for testing.
//!
//! These mirror the real seams (`ProductionApi`, `CommandRunner`) with
//! configurable behavior and recorded calls for assertions.

mod mock_api;
mod mock_runner;

pub use mock_api::{
    CompletionCall, ErrorCall, MockProductionApi, ProductQuery, QueueCall, StatusUpdate,
};
pub use mock_runner::{MockCommandRunner, RecordedCommand};

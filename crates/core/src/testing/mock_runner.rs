//! Mock command runner.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::command::{CommandError, CommandRunner};

/// A recorded command invocation for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedCommand {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
}

impl RecordedCommand {
    /// The full rendered command line.
    pub fn rendered(&self) -> String {
        let mut parts = vec![self.program.clone()];
        parts.extend(self.args.clone());
        parts.join(" ")
    }
}

/// Mock implementation of [`CommandRunner`].
///
/// Records every invocation and returns empty output by default. Failure
/// rules and canned responses match against the program name or any
/// argument substring.
#[derive(Default)]
pub struct MockCommandRunner {
    recorded: Arc<RwLock<Vec<RecordedCommand>>>,
    responses: Arc<RwLock<Vec<(String, String)>>>,
    failures: Arc<RwLock<Vec<String>>>,
}

impl MockCommandRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// All invocations so far, in order.
    pub async fn recorded(&self) -> Vec<RecordedCommand> {
        self.recorded.read().await.clone()
    }

    /// Return `output` for invocations whose program or arguments contain
    /// `needle`.
    pub async fn set_response_containing(&self, needle: &str, output: &str) {
        self.responses
            .write()
            .await
            .push((needle.to_string(), output.to_string()));
    }

    /// Fail invocations whose program or arguments contain `needle`.
    pub async fn fail_when_args_contain(&self, needle: &str) {
        self.failures.write().await.push(needle.to_string());
    }

    fn matches(needle: &str, program: &str, args: &[String]) -> bool {
        program.contains(needle) || args.iter().any(|a| a.contains(needle))
    }
}

#[async_trait]
impl CommandRunner for MockCommandRunner {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        cwd: Option<&Path>,
    ) -> Result<String, CommandError> {
        let record = RecordedCommand {
            program: program.to_string(),
            args: args.to_vec(),
            cwd: cwd.map(Path::to_path_buf),
        };
        let rendered = record.rendered();
        self.recorded.write().await.push(record);

        for needle in self.failures.read().await.iter() {
            if Self::matches(needle, program, args) {
                return Err(CommandError::Failed {
                    command: rendered,
                    code: 1,
                    output: format!("mock failure for [{needle}]"),
                });
            }
        }

        for (needle, output) in self.responses.read().await.iter() {
            if Self::matches(needle, program, args) {
                return Ok(output.clone());
            }
        }

        Ok(String::new())
    }
}

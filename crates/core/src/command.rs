//! External command execution.
//!
//! All of the science executables, `tar`, `ssh` and friends are invoked
//! through the [`CommandRunner`] trait so that processing logic can be
//! exercised in tests without the tools installed.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

/// Error type for external command execution.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// The command could not be spawned at all.
    #[error("failed to execute [{command}]: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The command exited with a non-zero code.
    #[error("command [{command}] returned error code [{code}]: {output}")]
    Failed {
        command: String,
        code: i32,
        output: String,
    },

    /// The command was terminated by a signal.
    #[error("command [{command}] terminated by signal: {output}")]
    Signalled { command: String, output: String },
}

impl CommandError {
    /// The combined stdout/stderr captured before the failure, if any.
    pub fn output(&self) -> Option<&str> {
        match self {
            CommandError::Spawn { .. } => None,
            CommandError::Failed { output, .. } | CommandError::Signalled { output, .. } => {
                Some(output.as_str())
            }
        }
    }
}

/// Executes an external command and captures its combined output.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args`, optionally in `cwd`.
    ///
    /// Returns the combined stdout/stderr on success. A non-zero exit code
    /// is an error carrying the captured output.
    async fn run(
        &self,
        program: &str,
        args: &[String],
        cwd: Option<&Path>,
    ) -> Result<String, CommandError>;
}

/// Runs commands as real child processes.
#[derive(Debug, Default, Clone)]
pub struct ShellRunner;

impl ShellRunner {
    pub fn new() -> Self {
        Self
    }
}

fn render(program: &str, args: &[String]) -> String {
    let mut parts = Vec::with_capacity(args.len() + 1);
    parts.push(program.to_string());
    parts.extend(args.iter().cloned());
    parts.join(" ")
}

#[async_trait]
impl CommandRunner for ShellRunner {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        cwd: Option<&Path>,
    ) -> Result<String, CommandError> {
        let rendered = render(program, args);

        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = cwd {
            command.current_dir(dir);
        }

        let output = command.output().await.map_err(|e| CommandError::Spawn {
            command: rendered.clone(),
            source: e,
        })?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.is_empty() {
            if !combined.is_empty() && !combined.ends_with('\n') {
                combined.push('\n');
            }
            combined.push_str(&stderr);
        }

        if output.status.success() {
            return Ok(combined);
        }

        match output.status.code() {
            Some(code) => Err(CommandError::Failed {
                command: rendered,
                code,
                output: combined,
            }),
            None => Err(CommandError::Signalled {
                command: rendered,
                output: combined,
            }),
        }
    }
}

/// Convenience owned-argument builder for command argument lists.
pub fn args<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    items.into_iter().map(Into::into).collect()
}

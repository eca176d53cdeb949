use std::path::PathBuf;

use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

use super::handle::JobLogRecord;

/// Background task appending job log records to the product's log file.
pub struct JobLogWriter {
    rx: mpsc::Receiver<JobLogRecord>,
    path: PathBuf,
}

impl JobLogWriter {
    pub fn new(rx: mpsc::Receiver<JobLogRecord>, path: PathBuf) -> Self {
        Self { rx, path }
    }

    /// Consume records until every handle is dropped and the channel
    /// drains. Spawn as a background task.
    pub async fn run(mut self) {
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await;

        let mut file = match file {
            Ok(f) => f,
            Err(e) => {
                tracing::error!("Failed to open job log {}: {e}", self.path.display());
                // Drain the channel so senders never block on a dead log.
                while self.rx.recv().await.is_some() {}
                return;
            }
        };

        while let Some(record) = self.rx.recv().await {
            let line = format!(
                "{} {:<8} -- {}\n",
                record.timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level.as_str(),
                record.message
            );
            if let Err(e) = file.write_all(line.as_bytes()).await {
                tracing::error!("Failed to write job log record: {e}");
            }
        }

        if let Err(e) = file.flush().await {
            tracing::error!("Failed to flush job log: {e}");
        }
    }
}

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

/// Severity of a job log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobLogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl JobLogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobLogLevel::Debug => "DEBUG",
            JobLogLevel::Info => "INFO",
            JobLogLevel::Warning => "WARNING",
            JobLogLevel::Error => "ERROR",
        }
    }
}

/// One line of a product's job log.
#[derive(Debug, Clone)]
pub struct JobLogRecord {
    pub timestamp: DateTime<Utc>,
    pub level: JobLogLevel,
    pub message: String,
}

/// Handle for emitting job log records.
///
/// Cheaply cloneable; records are sent over an async channel to the
/// background writer. Emitting never fails the caller: a full or closed
/// channel is reported through tracing and the record is dropped.
#[derive(Clone)]
pub struct JobLogHandle {
    tx: mpsc::Sender<JobLogRecord>,
    debug: bool,
}

impl JobLogHandle {
    pub fn new(tx: mpsc::Sender<JobLogRecord>, debug: bool) -> Self {
        Self { tx, debug }
    }

    async fn emit(&self, level: JobLogLevel, message: String) {
        let record = JobLogRecord {
            timestamp: Utc::now(),
            level,
            message,
        };
        if let Err(e) = self.tx.send(record).await {
            tracing::error!("Failed to emit job log record: {e}");
        }
    }

    pub async fn debug(&self, message: impl Into<String>) {
        if self.debug {
            self.emit(JobLogLevel::Debug, message.into()).await;
        }
    }

    pub async fn info(&self, message: impl Into<String>) {
        self.emit(JobLogLevel::Info, message.into()).await;
    }

    pub async fn warning(&self, message: impl Into<String>) {
        self.emit(JobLogLevel::Warning, message.into()).await;
    }

    pub async fn error(&self, message: impl Into<String>) {
        self.emit(JobLogLevel::Error, message.into()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_record() {
        let (tx, mut rx) = mpsc::channel(4);
        let handle = JobLogHandle::new(tx, false);

        handle.info("hello").await;

        let record = rx.recv().await.expect("should receive record");
        assert_eq!(record.level, JobLogLevel::Info);
        assert_eq!(record.message, "hello");
    }

    #[tokio::test]
    async fn test_emit_closed_channel_does_not_panic() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let handle = JobLogHandle::new(tx, false);
        handle.warning("dropped").await;
    }

    #[tokio::test]
    async fn test_debug_gated() {
        let (tx, mut rx) = mpsc::channel(4);
        let handle = JobLogHandle::new(tx, true);
        handle.debug("shown").await;
        assert_eq!(rx.recv().await.unwrap().level, JobLogLevel::Debug);
    }
}

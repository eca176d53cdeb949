//! Per-product job logs.
//!
//! Every product gets its own log file while it processes: the contents
//! are shipped to the production API when the product fails and archived
//! next to the distributed product when it succeeds. Records flow through
//! an async channel to a background writer so emitting never blocks
//! processing.

mod handle;
mod writer;

use std::path::{Path, PathBuf};

use tokio::sync::mpsc;

pub use handle::{JobLogHandle, JobLogLevel, JobLogRecord};
pub use writer::JobLogWriter;

/// Default buffer size for the job log channel.
pub const JOB_LOG_BUFFER_SIZE: usize = 256;

/// Log file name for a product: `espa-{order}-{product}.log`.
///
/// The `espa-` prefix and `.log` suffix are what the dispatch wrapper
/// concatenates after a pass.
pub fn job_log_path(log_dir: &Path, order_id: &str, product_id: &str) -> PathBuf {
    log_dir.join(format!("espa-{order_id}-{product_id}.log"))
}

/// Log file for the mapper itself (lines not tied to one product).
pub fn mapper_log_path(log_dir: &Path) -> PathBuf {
    log_dir.join("espa-mapper.log")
}

/// Create a job log writing to `path`.
///
/// Returns the emit handle and the writer; spawn the writer with
/// `tokio::spawn(writer.run())`. The writer exits once every handle clone
/// has been dropped and the channel drains.
pub fn create_job_log(path: PathBuf, debug: bool) -> (JobLogHandle, JobLogWriter) {
    let (tx, rx) = mpsc::channel(JOB_LOG_BUFFER_SIZE);
    let handle = JobLogHandle::new(tx, debug);
    let writer = JobLogWriter::new(rx, path);
    (handle, writer)
}

/// Read back the full log contents for error reporting.
pub async fn read_contents(path: &Path) -> std::io::Result<String> {
    tokio::fs::read_to_string(path).await
}

/// Archive a job log into `{distribution_dir}/logs/{order_id}/`.
///
/// Failures are reported to the caller but are routinely swallowed there:
/// archiving happens at the very end of processing and must not turn a
/// delivered product into a failure.
pub async fn archive(
    log_path: &Path,
    distribution_dir: &Path,
    order_id: &str,
) -> std::io::Result<PathBuf> {
    let destination_dir = distribution_dir.join("logs").join(order_id);
    tokio::fs::create_dir_all(&destination_dir).await?;

    let file_name = log_path
        .file_name()
        .ok_or_else(|| std::io::Error::other("log path has no file name"))?;
    let destination = destination_dir.join(file_name);

    tokio::fs::copy(log_path, &destination).await?;
    Ok(destination)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_log_path_format() {
        let path = job_log_path(
            Path::new("/tmp"),
            "order-123",
            "LT05_L1TP_038038_19950624_20160302_01_T1",
        );
        assert_eq!(
            path.to_str().unwrap(),
            "/tmp/espa-order-123-LT05_L1TP_038038_19950624_20160302_01_T1.log"
        );
    }

    #[tokio::test]
    async fn test_round_trip_and_archive() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = job_log_path(dir.path(), "o1", "p1");

        let (handle, writer) = create_job_log(log_path.clone(), false);
        let writer_task = tokio::spawn(writer.run());

        handle.info("staging input").await;
        handle.error("boom").await;
        drop(handle);
        writer_task.await.unwrap();

        let contents = read_contents(&log_path).await.unwrap();
        assert!(contents.contains("staging input"));
        assert!(contents.contains("boom"));

        let dist = dir.path().join("dist");
        let archived = archive(&log_path, &dist, "o1").await.unwrap();
        assert!(archived.ends_with("logs/o1/espa-o1-p1.log"));
        let archived_contents = tokio::fs::read_to_string(&archived).await.unwrap();
        assert_eq!(archived_contents, contents);
    }

    #[tokio::test]
    async fn test_debug_records_dropped_unless_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = job_log_path(dir.path(), "o2", "p2");

        let (handle, writer) = create_job_log(log_path.clone(), false);
        let writer_task = tokio::spawn(writer.run());
        handle.debug("hidden").await;
        handle.info("visible").await;
        drop(handle);
        writer_task.await.unwrap();

        let contents = read_contents(&log_path).await.unwrap();
        assert!(!contents.contains("hidden"));
        assert!(contents.contains("visible"));
    }
}

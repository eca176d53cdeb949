//! Test rig for dispatch-pass integration tests: stub pipeline
//! executables and a recording production API server.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::routing::get;
use axum::Router;

/// Calls received by the mock production API, in arrival order.
pub type CallLog = Arc<Mutex<Vec<String>>>;

async fn reset_status(State(calls): State<CallLog>) -> &'static str {
    calls.lock().unwrap().push("reset-status".to_string());
    "{}"
}

async fn handle_orders(State(calls): State<CallLog>) -> &'static str {
    calls.lock().unwrap().push("handle-orders".to_string());
    "{}"
}

/// Start a mock production API recording reset-status/handle-orders GETs.
///
/// Returns the base URL and the shared call log.
pub async fn start_mock_api() -> (String, CallLog) {
    let calls: CallLog = Arc::new(Mutex::new(Vec::new()));

    let app = Router::new()
        .route("/production-api/v0/reset-status", get(reset_status))
        .route("/production-api/v0/handle-orders", get(handle_orders))
        .with_state(Arc::clone(&calls));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{addr}"), calls)
}

/// Write an executable stub script.
pub fn write_stub(path: &Path, body: &str) -> PathBuf {
    let script = format!("#!/bin/sh\n{body}\n");
    std::fs::write(path, script).unwrap();

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    path.to_path_buf()
}

/// A stub selector that records its arguments and the `*.log` files
/// visible in the log directory when it starts, then emits nothing.
pub fn selector_stub(dir: &Path, log_dir: &Path) -> PathBuf {
    let body = format!(
        r#"printf '%s\n' "$@" > {dir}/selector-args.txt
ls {log_dir}/*.log > {dir}/logs-at-start.txt 2>/dev/null || true"#,
        dir = dir.display(),
        log_dir = log_dir.display(),
    );
    write_stub(&dir.join("selector-stub"), &body)
}

/// A stub mapper that drains stdin and exits with the given status.
pub fn mapper_stub(dir: &Path, exit_code: i32) -> PathBuf {
    let body = format!(
        r#"cat > {dir}/mapper-stdin.txt
exit {exit_code}"#,
        dir = dir.display(),
    );
    write_stub(&dir.join("mapper-stub"), &body)
}

//! The dispatch wrapper's observable contract, exercised with stub
//! pipeline executables and a recording production API.

mod common;

use std::path::Path;

use espa_core::dispatch::{run_pass, DispatchConfig};

use common::{mapper_stub, selector_stub, start_mock_api, write_stub};

fn dispatch_config(dir: &Path, api_base: &str) -> DispatchConfig {
    DispatchConfig {
        selector_bin: dir.join("selector-stub"),
        mapper_bin: dir.join("mapper-stub"),
        log_dir: dir.join("logs"),
        work_dir: dir.join("workspace"),
        api_base: api_base.to_string(),
        interactive: false,
        shell: "/bin/sh".to_string(),
    }
}

async fn setup(dir: &Path, mapper_exit: i32) -> (DispatchConfig, common::CallLog) {
    let log_dir = dir.join("logs");
    tokio::fs::create_dir_all(&log_dir).await.unwrap();
    tokio::fs::create_dir_all(dir.join("workspace")).await.unwrap();

    selector_stub(dir, &log_dir);
    mapper_stub(dir, mapper_exit);

    let (api_base, calls) = start_mock_api().await;
    (dispatch_config(dir, &api_base), calls)
}

#[tokio::test]
async fn test_prior_logs_are_removed_before_the_pipeline_starts() {
    let dir = tempfile::tempdir().unwrap();
    let (config, _calls) = setup(dir.path(), 0).await;

    // Leftovers from a previous pass.
    tokio::fs::write(config.log_dir.join("espa-old-run.log"), b"stale")
        .await
        .unwrap();
    tokio::fs::write(config.log_dir.join("espa-mapper.log"), b"stale")
        .await
        .unwrap();

    run_pass(&config).await.unwrap();

    // The selector stub listed the log directory as its first action:
    // nothing matched.
    let listing = tokio::fs::read_to_string(dir.path().join("logs-at-start.txt"))
        .await
        .unwrap();
    assert_eq!(listing.trim(), "");
}

#[tokio::test]
async fn test_selector_arguments_are_exactly_fixed() {
    let dir = tempfile::tempdir().unwrap();
    let (config, _calls) = setup(dir.path(), 0).await;

    run_pass(&config).await.unwrap();

    let recorded = tokio::fs::read_to_string(dir.path().join("selector-args.txt"))
        .await
        .unwrap();
    let args: Vec<&str> = recorded.lines().collect();
    assert_eq!(
        args,
        vec!["--priority", "all", "--limit", "1", "--product-types", "abi"]
    );
}

#[tokio::test]
async fn test_api_calls_fire_once_each_even_when_the_pipeline_fails() {
    let dir = tempfile::tempdir().unwrap();
    // The mapper fails outright.
    let (config, calls) = setup(dir.path(), 1).await;

    let summary = run_pass(&config).await.unwrap();

    assert_eq!(summary.mapper_status, Some(1));
    assert!(summary.reset_status_ok);
    assert!(summary.handle_orders_ok);

    // Exactly one call each, reset-status first.
    let calls = calls.lock().unwrap().clone();
    assert_eq!(calls, vec!["reset-status", "handle-orders"]);
}

#[tokio::test]
async fn test_selector_output_is_piped_into_the_mapper() {
    let dir = tempfile::tempdir().unwrap();
    let (mut config, _calls) = setup(dir.path(), 0).await;

    // A selector that emits one request line.
    config.selector_bin = write_stub(
        &dir.path().join("selector-stub"),
        r#"echo '{"orderid": "o1"}'"#,
    );

    run_pass(&config).await.unwrap();

    let seen = tokio::fs::read_to_string(dir.path().join("mapper-stdin.txt"))
        .await
        .unwrap();
    assert_eq!(seen.trim(), r#"{"orderid": "o1"}"#);
}

#[tokio::test]
async fn test_pass_logs_are_concatenated_after_the_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let (mut config, _calls) = setup(dir.path(), 0).await;

    // A selector that writes a pass log the wrapper should pick up.
    let body = format!(
        "echo 'selected one product' > {}/espa-selector-run.log",
        config.log_dir.display()
    );
    config.selector_bin = write_stub(&dir.path().join("selector-stub"), &body);

    let summary = run_pass(&config).await.unwrap();
    assert_eq!(summary.selector_status, Some(0));
    // The log file written during the pass survives it.
    assert!(config.log_dir.join("espa-selector-run.log").exists());
}

#[tokio::test]
async fn test_tarball_housekeeping_summary() {
    let dir = tempfile::tempdir().unwrap();
    let (config, _calls) = setup(dir.path(), 0).await;

    let summary = run_pass(&config).await.unwrap();
    assert!(!summary.tarball_found);

    tokio::fs::write(
        config.work_dir.join("espa-jbrinkmann-drop.tar.gz"),
        b"tarball",
    )
    .await
    .unwrap();

    let summary = run_pass(&config).await.unwrap();
    assert!(summary.tarball_found);
}

/// The literal console contract of the housekeeping check, verified
/// against the real binary. The interactive shell never opens because the
/// child's stdin is not a terminal.
///
/// Uses a multi-threaded runtime: this test drives the binary with a
/// blocking `std::process::Command::output()`, which would occupy a
/// single-threaded runtime's only thread and starve the in-process mock
/// API server the binary calls into, deadlocking the test.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_dispatch_pass_binary_prints_nope_and_yes() {
    let dir = tempfile::tempdir().unwrap();
    let (config, _calls) = setup(dir.path(), 0).await;

    // Minimal configuration files for the binary.
    let proc_conf = dir.path().join("processing.conf");
    std::fs::write(
        &proc_conf,
        format!(
            "[processing]\nespa_api = {}\nespa_distribution_method = local\nespa_distribution_dir = {}\n",
            config.api_base,
            dir.path().join("cache").display(),
        ),
    )
    .unwrap();
    let cron_conf = dir.path().join("espa-cron.toml");
    std::fs::write(
        &cron_conf,
        format!("log_dir = \"{}\"\n", config.log_dir.display()),
    )
    .unwrap();

    let run_binary = || {
        let output = std::process::Command::new(env!("CARGO_BIN_EXE_dispatch-pass"))
            .current_dir(&config.work_dir)
            .env("ESPA_PROCESSING_CONFIG", &proc_conf)
            .env("ESPA_CRON_CONFIG", &cron_conf)
            .env("ESPA_SELECTOR_BIN", &config.selector_bin)
            .env("ESPA_MAPPER_BIN", &config.mapper_bin)
            .stdin(std::process::Stdio::null())
            .output()
            .expect("dispatch-pass binary must run");
        String::from_utf8_lossy(&output.stdout).into_owned()
    };

    let stdout = run_binary();
    assert!(stdout.contains("nope!"), "stdout was: {stdout}");
    assert!(!stdout.contains("YES!"));

    std::fs::write(
        config.work_dir.join("espa-jbrinkmann-drop.tar.gz"),
        b"tarball",
    )
    .unwrap();

    let stdout = run_binary();
    assert!(stdout.contains("YES!"), "stdout was: {stdout}");
    assert!(!stdout.contains("nope!"));
}

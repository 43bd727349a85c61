//! Global logger installation writes to the rolling file

use gate_resilience::logging::{init_logging, LogConfig};
use std::time::Duration;

#[test]
fn test_file_logging_writes_events() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("logs").join("resilience.log");

    temp_env::with_var_unset("RUST_LOG", || {
        init_logging(LogConfig {
            file_path: Some(log_path.clone()),
            stderr: false,
            json: true,
            ..LogConfig::default()
        })
        .unwrap();
    });

    tracing::info!(category = "connection_transport", "gate socket dropped");
    tracing::debug!("below default level");

    // A second install must fail rather than replace the first
    assert!(init_logging(LogConfig::default()).is_err());

    std::thread::sleep(Duration::from_millis(50));
    let written: String = std::fs::read_dir(log_path.parent().unwrap())
        .unwrap()
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry
                .file_name()
                .to_string_lossy()
                .starts_with("resilience.log")
        })
        .map(|entry| std::fs::read_to_string(entry.path()).unwrap())
        .collect();

    assert!(written.contains("gate socket dropped"));
    assert!(written.contains("\"category\":\"connection_transport\""));
    assert!(!written.contains("below default level"));
}

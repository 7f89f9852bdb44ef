// tests/config_loader.rs

use std::io::Write;
use std::time::Duration;

use tapebridge::config::{load_and_validate, load_or_default};
use tapebridge::errors::BridgeError;
use tempfile::NamedTempFile;

#[test]
fn full_config_is_parsed_and_validated() {
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
[queue]
poll_interval = "50ms"
fetch_timeout = "2m"
sweep_interval = "10s"

[driver]
max_iterations = 20
prefetch = ["https://example.com/solver.js"]

[rpc]
call_timeout = "90s"
sandbox_timeout = "5s"

[log]
ring_capacity = 50
verbose = true

[host]
ffmpeg = "/opt/ffmpeg/bin/ffmpeg"
"#
    )
    .unwrap();

    let cfg = load_and_validate(file.path()).unwrap();

    assert_eq!(cfg.queue.poll_interval, Duration::from_millis(50));
    assert_eq!(cfg.queue.fetch_timeout, Duration::from_secs(120));
    assert_eq!(cfg.queue.download_timeout, Duration::from_secs(600));
    assert_eq!(cfg.queue.sweep_interval, Duration::from_secs(10));
    assert_eq!(cfg.driver.max_iterations, 20);
    assert_eq!(cfg.driver.prefetch, vec!["https://example.com/solver.js".to_string()]);
    assert_eq!(cfg.rpc.call_timeout, Duration::from_secs(90));
    assert_eq!(cfg.rpc.sandbox_timeout, Duration::from_secs(5));
    assert_eq!(cfg.log.ring_capacity, 50);
    assert!(cfg.log.verbose);
    assert_eq!(cfg.host.ffmpeg, "/opt/ffmpeg/bin/ffmpeg");
    assert_eq!(cfg.host.ffprobe, "ffprobe");
}

#[test]
fn bad_duration_is_a_config_error() {
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
[rpc]
call_timeout = "5 fortnights"
"#
    )
    .unwrap();

    match load_and_validate(file.path()) {
        Err(BridgeError::ConfigError(msg)) => assert!(msg.contains("call_timeout")),
        other => panic!("expected ConfigError, got {other:?}"),
    }
}

#[test]
fn zero_iteration_budget_is_rejected() {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "[driver]\nmax_iterations = 0\n").unwrap();

    let err = load_and_validate(file.path()).unwrap_err();
    assert!(matches!(err, BridgeError::ConfigError(_)));
}

#[test]
fn malformed_toml_is_reported() {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "[queue\npoll_interval = ").unwrap();

    let err = load_and_validate(file.path()).unwrap_err();
    assert!(matches!(err, BridgeError::TomlError(_)));
}

#[test]
fn missing_file_falls_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = load_or_default(dir.path().join("Tapebridge.toml")).unwrap();

    assert_eq!(cfg.queue.poll_interval, Duration::from_millis(100));
    assert_eq!(cfg.queue.challenge_poll_interval, Duration::from_millis(50));
    assert_eq!(cfg.queue.challenge_timeout, Duration::from_secs(120));
    assert_eq!(cfg.driver.max_iterations, 100);
    assert_eq!(cfg.rpc.call_timeout, Duration::from_secs(300));
    assert_eq!(cfg.log.ring_capacity, 1000);

    let err = load_and_validate(dir.path().join("Tapebridge.toml")).unwrap_err();
    assert!(matches!(err, BridgeError::IoError(_)));
}

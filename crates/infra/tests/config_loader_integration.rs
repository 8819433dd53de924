//! Integration tests for configuration loader
//!
//! Tests the end-to-end behavior of loading configuration from files and
//! running operations through the registry built from it.

use std::io::Write;
use std::time::Duration;

use rampart_common::resilience::{BackoffStrategy, OperationFailure};
use rampart_infra::{build_registry, config};
use tempfile::Builder;

fn write_config(extension: &str, contents: &str) -> tempfile::NamedTempFile {
    let mut file = Builder::new()
        .prefix("rampart")
        .suffix(&format!(".{extension}"))
        .tempfile()
        .expect("Failed to create temp file");
    file.write_all(contents.as_bytes()).expect("Failed to write to temp file");
    file
}

#[test]
fn test_load_config_from_json_file() {
    let file = write_config(
        "json",
        r#"{
            "defaults": {
                "max_attempts": 4,
                "initial_delay_ms": 100,
                "max_delay_ms": 2000,
                "strategy": "exponential",
                "backoff_factor": 3.0,
                "jitter": false
            },
            "executors": {
                "erp.orders": { "max_attempts": 2, "strategy": "fixed", "attempt_timeout_ms": 500 }
            },
            "log": { "format": "json", "filter": "rampart=debug" }
        }"#,
    );

    let config = config::load_from_file(Some(file.path().to_path_buf()))
        .expect("Failed to load config from JSON file");

    assert_eq!(config.defaults.max_attempts, 4);
    assert_eq!(config.defaults.max_delay, Duration::from_secs(2));
    assert!((config.defaults.backoff_factor - 3.0).abs() < f64::EPSILON);

    let orders = &config.executors["erp.orders"];
    assert_eq!(orders.strategy, BackoffStrategy::Fixed);
    assert_eq!(orders.attempt_timeout, Some(Duration::from_millis(500)));
    assert_eq!(config.log.filter.as_deref(), Some("rampart=debug"));
}

/// Validates a preset loaded from TOML drives a real executor.
///
/// Assertions:
/// - The preset's attempt budget is honored.
/// - The exhausted call is dead-lettered on the shared executor.
#[tokio::test(start_paused = true)]
async fn test_registry_from_toml_runs_preset() {
    let file = write_config(
        "toml",
        r#"
[defaults]
max_attempts = 5

[executors."crm.contacts"]
max_attempts = 2
strategy = "fixed"
initial_delay_ms = 20
jitter = false
"#,
    );

    let config = config::load_from_file(Some(file.path().to_path_buf())).unwrap();
    let registry = build_registry(&config).unwrap();

    let settings = registry.config("crm.contacts").build().unwrap();
    let executor = registry.get_or_create::<String, OperationFailure>(settings).unwrap();

    let started = tokio::time::Instant::now();
    let outcome = executor
        .execute(|| async { Err(OperationFailure::network("ECONNREFUSED")) })
        .await;

    assert_eq!(outcome.attempts, 2);
    assert_eq!(started.elapsed(), Duration::from_millis(20));
    assert_eq!(executor.dead_letters().len(), 1);
    assert_eq!(registry.config("anything.else").build().unwrap().settings.max_attempts, 5);
}

#[test]
fn test_invalid_toml_is_rejected() {
    let file = write_config("toml", "[defaults\nmax_attempts = 3");

    let err = config::load_from_file(Some(file.path().to_path_buf())).unwrap_err();
    assert!(err.to_string().contains("Invalid TOML format"));
}

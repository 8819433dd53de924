//! Configuration loading and management
//!
//! This module provides utilities for loading resilience configuration
//! from environment variables and files, and for turning it into an
//! [`ExecutorRegistry`](rampart_common::resilience::ExecutorRegistry).

pub mod loader;

use std::collections::BTreeMap;

use rampart_common::resilience::{BackoffStrategy, ExecutorRegistry, RetrySettings};
use serde::{Deserialize, Serialize};

use crate::errors::{InfraError, Result};
use crate::observability::LogConfig;

// Re-export commonly used items
pub use loader::{load, load_from_env, load_from_file, probe_config_paths};

/// Complete engine configuration
///
/// ```toml
/// [defaults]
/// max_attempts = 3
/// initial_delay_ms = 1000
/// strategy = "exponential"
///
/// [executors."crm.contacts"]
/// max_attempts = 5
/// strategy = "linear"
///
/// [log]
/// format = "json"
/// ```
///
/// Sections are optional. Each `executors` entry is a full settings table:
/// fields it omits take the built-in defaults, not the `[defaults]` ones.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceConfig {
    /// Settings for executors without a preset
    pub defaults: RetrySettings,
    /// Per-executor presets keyed by logical name
    pub executors: BTreeMap<String, RetrySettings>,
    /// Tracing output settings
    pub log: LogConfig,
}

impl ResilienceConfig {
    /// Validate the defaults and every preset
    ///
    /// # Errors
    /// Returns `InfraError::Config` naming the first invalid section.
    pub fn validate(&self) -> Result<()> {
        validate_section("defaults", &self.defaults)?;
        for (name, settings) in &self.executors {
            validate_section(&format!("executors.{name}"), settings)?;
        }
        Ok(())
    }
}

fn validate_section(section: &str, settings: &RetrySettings) -> Result<()> {
    settings.validate().map_err(|e| InfraError::config(format!("[{section}]: {e}")))?;
    // A delay function cannot be expressed in a file or variable.
    if settings.strategy == BackoffStrategy::Custom {
        return Err(InfraError::config(format!(
            "[{section}]: custom backoff must be configured in code"
        )));
    }
    Ok(())
}

/// Create a registry seeded with the configured defaults and presets
///
/// # Errors
/// Returns `InfraError::Config` if the configuration does not validate.
pub fn build_registry(config: &ResilienceConfig) -> Result<ExecutorRegistry> {
    config.validate()?;
    tracing::info!(
        presets = config.executors.len(),
        max_attempts = config.defaults.max_attempts,
        strategy = %config.defaults.strategy,
        "Executor registry configured"
    );
    Ok(ExecutorRegistry::with_settings(
        config.defaults.clone(),
        config.executors.iter().map(|(name, settings)| (name.clone(), settings.clone())),
    ))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rampart_common::resilience::OperationFailure;

    use super::*;

    fn sample() -> ResilienceConfig {
        toml::from_str(
            r#"
[defaults]
max_attempts = 4
initial_delay_ms = 250
jitter = false

[executors."crm.contacts"]
max_attempts = 6
strategy = "linear"
attempt_timeout_ms = 2000
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_partial_sections_take_defaults() {
        let config = sample();

        assert_eq!(config.defaults.max_attempts, 4);
        assert_eq!(config.defaults.initial_delay, Duration::from_millis(250));
        assert_eq!(config.defaults.strategy, BackoffStrategy::Exponential);

        let preset = &config.executors["crm.contacts"];
        assert_eq!(preset.strategy, BackoffStrategy::Linear);
        assert_eq!(preset.attempt_timeout, Some(Duration::from_secs(2)));
        assert!(preset.jitter, "preset fields fall back to built-in defaults");
        assert_eq!(config.log, LogConfig::default());
    }

    #[test]
    fn test_validate_names_bad_preset() {
        let mut config = sample();
        config
            .executors
            .insert("broken".into(), RetrySettings { max_attempts: 0, ..RetrySettings::default() });

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("[executors.broken]"));
        assert!(build_registry(&config).is_err());
    }

    #[test]
    fn test_validate_rejects_custom_strategy() {
        let mut config = ResilienceConfig::default();
        config.defaults.strategy = BackoffStrategy::Custom;

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("[defaults]"));
    }

    #[test]
    fn test_build_registry_applies_presets() {
        let registry = build_registry(&sample()).unwrap();

        let preset = registry.config("crm.contacts").build().unwrap();
        assert_eq!(preset.settings.max_attempts, 6);

        let fallback = registry.config("billing").build().unwrap();
        assert_eq!(fallback.settings.max_attempts, 4);
        assert!(!fallback.settings.jitter);

        let executor = registry.get_or_create::<String, OperationFailure>(preset).unwrap();
        assert_eq!(executor.name(), "crm.contacts");
    }
}

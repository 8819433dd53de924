//! Configuration loader
//!
//! Loads resilience configuration from environment variables or files.
//!
//! ## Loading Strategy
//! 1. First, attempts to load from environment variables
//! 2. If `RAMPART_RETRY_MAX_ATTEMPTS` is unset, falls back to a config file
//! 3. Probes multiple paths for config files
//! 4. Supports JSON and TOML formats
//! 5. Without any source, the built-in defaults are used
//!
//! ## Environment Variables
//! - `RAMPART_RETRY_MAX_ATTEMPTS`: Total tries per operation (required for
//!   environment loading)
//! - `RAMPART_RETRY_INITIAL_DELAY_MS`: First retry delay in milliseconds
//! - `RAMPART_RETRY_MAX_DELAY_MS`: Delay cap in milliseconds
//! - `RAMPART_RETRY_STRATEGY`: `exponential`, `linear` or `fixed`
//! - `RAMPART_RETRY_BACKOFF_FACTOR`: Exponential multiplier
//! - `RAMPART_RETRY_JITTER`: Whether ±10% jitter is applied (true/false)
//! - `RAMPART_RETRY_TIMEOUT_MS`: Per-attempt timeout in milliseconds
//! - `RAMPART_LOG_FORMAT`: `pretty` or `json`
//!
//! Environment loading only sets the defaults; per-executor presets come from
//! files.
//!
//! ## File Locations
//! The loader probes the following paths (in order):
//! 1. `./rampart.toml` or `./rampart.json` (current working directory)
//! 2. `../rampart.toml` or `../rampart.json` (parent directory)
//! 3. Relative to executable location

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use rampart_common::error::CommonError;
use rampart_common::resilience::{BackoffStrategy, RetrySettings};

use super::ResilienceConfig;
use crate::errors::{InfraError, Result};
use crate::observability::LogConfig;

const CONFIG_FILE_NAMES: [&str; 2] = ["rampart.toml", "rampart.json"];

/// Load configuration with automatic fallback strategy
///
/// # Errors
/// Returns `InfraError::Config` if a source exists but cannot be parsed or
/// does not validate.
pub fn load() -> Result<ResilienceConfig> {
    if std::env::var_os("RAMPART_RETRY_MAX_ATTEMPTS").is_some() {
        let config = load_from_env()?;
        tracing::info!("Configuration loaded from environment variables");
        return Ok(config);
    }

    match probe_config_paths() {
        Some(path) => load_from_file(Some(path)),
        None => {
            tracing::debug!("No configuration source found, using built-in defaults");
            Ok(ResilienceConfig::default())
        }
    }
}

/// Load configuration from environment variables
///
/// `RAMPART_RETRY_MAX_ATTEMPTS` must be present; every other variable is
/// optional and overrides the built-in default.
///
/// # Errors
/// Returns `InfraError::Config` if the required variable is missing or a
/// value cannot be parsed.
pub fn load_from_env() -> Result<ResilienceConfig> {
    let mut defaults = RetrySettings {
        max_attempts: env_parse("RAMPART_RETRY_MAX_ATTEMPTS")?,
        ..RetrySettings::default()
    };

    if let Some(ms) = env_parse_opt::<u64>("RAMPART_RETRY_INITIAL_DELAY_MS")? {
        defaults.initial_delay = Duration::from_millis(ms);
    }
    if let Some(ms) = env_parse_opt::<u64>("RAMPART_RETRY_MAX_DELAY_MS")? {
        defaults.max_delay = Duration::from_millis(ms);
    }
    if let Some(strategy) = env_parse_opt::<BackoffStrategy>("RAMPART_RETRY_STRATEGY")? {
        defaults.strategy = strategy;
    }
    if let Some(factor) = env_parse_opt::<f64>("RAMPART_RETRY_BACKOFF_FACTOR")? {
        defaults.backoff_factor = factor;
    }
    defaults.jitter = env_bool("RAMPART_RETRY_JITTER", defaults.jitter);
    defaults.attempt_timeout =
        env_parse_opt::<u64>("RAMPART_RETRY_TIMEOUT_MS")?.map(Duration::from_millis);

    let mut log = LogConfig::default();
    if let Some(format) = env_parse_opt("RAMPART_LOG_FORMAT")? {
        log.format = format;
    }

    let config = ResilienceConfig { defaults, log, ..ResilienceConfig::default() };
    config.validate()?;
    Ok(config)
}

/// Load configuration from a file
///
/// If `path` is `None`, probes the standard locations.
///
/// # Errors
/// Returns `InfraError::Config` if:
/// - File not found (when path is specified)
/// - No config file found (when path is `None`)
/// - File format is invalid or settings do not validate
///
/// Returns `InfraError::Common` with a persistence error if the file exists
/// but cannot be read.
pub fn load_from_file(path: Option<PathBuf>) -> Result<ResilienceConfig> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(InfraError::config(format!("Config file not found: {}", p.display())));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            InfraError::config("No config file found in any of the standard locations")
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path).map_err(|e| {
        CommonError::persistence_during(format!("read {}", config_path.display()), e.to_string())
    })?;

    let config = parse_config(&contents, &config_path)?;
    config.validate()?;
    Ok(config)
}

/// Parse configuration from string content
///
/// Format is detected by file extension (`.json` or `.toml`).
fn parse_config(contents: &str, path: &Path) -> Result<ResilienceConfig> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| InfraError::config(format!("Invalid TOML format: {e}"))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| InfraError::config(format!("Invalid JSON format: {e}"))),
        _ => Err(InfraError::config(format!("Unsupported config format: {extension}"))),
    }
}

/// Probe multiple paths for configuration files
///
/// # Returns
/// The first config file found, or `None` if no file exists.
pub fn probe_config_paths() -> Option<PathBuf> {
    let mut dirs = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        dirs.push(cwd.clone());
        dirs.push(cwd.join(".."));
    }
    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            dirs.push(exe_dir.to_path_buf());
        }
    }

    dirs.iter()
        .flat_map(|dir| CONFIG_FILE_NAMES.iter().map(move |name| dir.join(name)))
        .find(|path| path.exists())
}

fn env_parse<T>(key: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    env_parse_opt(key)?
        .ok_or_else(|| InfraError::config(format!("Missing required environment variable: {key}")))
}

fn env_parse_opt<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| InfraError::config(format!("Invalid value for {key}: {e}"))),
        Err(_) => Ok(None),
    }
}

/// Parse boolean from environment variable
///
/// Accepts: `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off` (case-insensitive)
fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

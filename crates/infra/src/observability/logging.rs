//! Log output configuration
//!
//! ## Filter precedence
//! 1. `RAMPART_LOG`
//! 2. `RUST_LOG`
//! 3. [`LogConfig::filter`]
//! 4. `info`
//!
//! An unparsable directive string falls back to `info` with a warning.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt as fmt_layer, EnvFilter};

use crate::errors::{InfraError, Result};

/// Environment variable holding filter directives
pub const LOG_ENV: &str = "RAMPART_LOG";

const DEFAULT_DIRECTIVES: &str = "info";

/// Output format of the fmt layer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human readable, one line per event
    #[default]
    Pretty,
    /// One JSON object per event
    Json,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pretty => f.write_str("pretty"),
            Self::Json => f.write_str("json"),
        }
    }
}

impl FromStr for LogFormat {
    type Err = InfraError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" | "fmt" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(InfraError::config(format!("Unknown log format: {other}"))),
        }
    }
}

/// Logging section of the configuration file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Human-readable or JSON lines
    pub format: LogFormat,
    /// Filter directives used when neither `RAMPART_LOG` nor `RUST_LOG` is set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

/// Build the filter according to the precedence above
pub fn env_filter(config: &LogConfig) -> EnvFilter {
    let directives = std::env::var(LOG_ENV)
        .or_else(|_| std::env::var(EnvFilter::DEFAULT_ENV))
        .ok()
        .or_else(|| config.filter.clone())
        .unwrap_or_else(|| DEFAULT_DIRECTIVES.to_string());

    EnvFilter::try_new(&directives).unwrap_or_else(|e| {
        tracing::warn!(directives = %directives, error = %e, "Invalid log filter, using default");
        EnvFilter::new(DEFAULT_DIRECTIVES)
    })
}

/// Install the global subscriber
///
/// # Errors
/// Returns `InfraError::Logging` if a global subscriber is already set.
pub fn init_tracing(config: &LogConfig) -> Result<()> {
    let registry = tracing_subscriber::registry().with(env_filter(config));

    let installed = match config.format {
        LogFormat::Pretty => registry.with(fmt_layer::layer().with_target(true)).try_init(),
        LogFormat::Json => registry
            .with(fmt_layer::layer().json().with_current_span(true).with_span_list(false))
            .try_init(),
    };

    installed.map_err(|e| InfraError::Logging(e.to_string()))?;
    tracing::debug!(format = %config.format, "Tracing initialized");
    Ok(())
}

//! Infrastructure error type
//!
//! Configuration and logging setup fail with [`InfraError`]. Engine errors
//! raised while validating loaded settings are carried through unchanged.

use rampart_common::error::{CommonError, ErrorClassification, ErrorSeverity};
use rampart_common::resilience::ResilienceError;
use thiserror::Error;

/// Errors raised while bootstrapping the resilience engine
#[derive(Debug, Error)]
pub enum InfraError {
    /// Missing or malformed configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// The global tracing subscriber could not be installed
    #[error("Logging setup failed: {0}")]
    Logging(String),

    /// Loaded settings were rejected by the engine
    #[error(transparent)]
    Resilience(#[from] ResilienceError),

    #[error(transparent)]
    Common(#[from] CommonError),
}

/// Result type for infrastructure operations
pub type Result<T> = std::result::Result<T, InfraError>;

impl InfraError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

rampart_common::impl_error_classification!(InfraError, Common,
    Self::Config(_) => {
        retryable: false,
        severity: ErrorSeverity::Error,
        critical: false,
    },
    Self::Logging(_) => {
        retryable: false,
        severity: ErrorSeverity::Warning,
        critical: false,
    },
    Self::Resilience(e) => {
        retryable: e.is_retryable(),
        severity: e.severity(),
        critical: e.is_critical(),
    },
);

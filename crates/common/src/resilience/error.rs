//! Error types for the resilience engine

use std::borrow::Cow;
use std::time::Duration;

use thiserror::Error;

use super::classify::{Failure, TIMEOUT_CODE};
use crate::error::{CommonError, ErrorSeverity};

/// Terminal error of a single `execute()` call
///
/// `Operation` carries the caller's own error untouched, so exhausted
/// operations surface the original failure rather than a wrapper.
#[derive(Debug, Error)]
pub enum ExecutionError<E> {
    /// The operation itself failed
    #[error("{0}")]
    Operation(E),

    /// An attempt exceeded the per-attempt timeout
    #[error("Operation timed out after {}ms", .after.as_millis())]
    TimedOut { operation: String, after: Duration },

    /// The executor's configuration could not produce a delay
    #[error("Invalid retry configuration: {message}")]
    InvalidConfiguration { message: String },
}

impl<E> ExecutionError<E> {
    /// Whether an attempt hit its timeout
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::TimedOut { .. })
    }

    /// Borrow the caller's error, if the operation produced one
    pub const fn operation_error(&self) -> Option<&E> {
        match self {
            Self::Operation(e) => Some(e),
            _ => None,
        }
    }

    /// Take the caller's error, if the operation produced one
    pub fn into_operation_error(self) -> Option<E> {
        match self {
            Self::Operation(e) => Some(e),
            _ => None,
        }
    }
}

impl<E: Failure> Failure for ExecutionError<E> {
    fn kind(&self) -> Cow<'_, str> {
        match self {
            Self::Operation(e) => e.kind(),
            Self::TimedOut { .. } => Cow::Borrowed("TimeoutError"),
            Self::InvalidConfiguration { .. } => Cow::Borrowed("ConfigurationError"),
        }
    }

    fn code(&self) -> Option<Cow<'_, str>> {
        match self {
            Self::Operation(e) => e.code(),
            Self::TimedOut { .. } => Some(Cow::Borrowed(TIMEOUT_CODE)),
            Self::InvalidConfiguration { .. } => None,
        }
    }
}

/// Errors raised by configuration, the registry and dead-letter management
#[derive(Debug, Error)]
pub enum ResilienceError {
    #[error("Invalid retry configuration: {message}")]
    InvalidConfiguration { message: String },

    #[error("Executor '{name}' is already registered with different settings")]
    ConfigConflict { name: String },

    #[error("Executor '{name}' is registered for a different operation type")]
    TypeMismatch { name: String },

    #[error("Dead letter '{id}' not found")]
    DeadLetterNotFound { id: String },

    #[error(transparent)]
    Common(#[from] CommonError),
}

/// Result type for resilience operations
pub type ResilienceResult<T> = Result<T, ResilienceError>;

impl ResilienceError {
    /// Configuration error with a free-form message
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration { message: message.into() }
    }

    pub(crate) fn missing_delay_fn() -> Self {
        Self::invalid_config("custom backoff strategy requires a delay function")
    }
}

crate::impl_error_conversion!(ResilienceError, Common);

crate::impl_error_classification!(ResilienceError, Common,
    Self::InvalidConfiguration { .. } => {
        retryable: false,
        severity: ErrorSeverity::Error,
        critical: false,
    },
    Self::ConfigConflict { .. } => {
        retryable: false,
        severity: ErrorSeverity::Warning,
        critical: false,
    },
    Self::TypeMismatch { .. } => {
        retryable: false,
        severity: ErrorSeverity::Error,
        critical: false,
    },
    Self::DeadLetterNotFound { .. } => {
        retryable: false,
        severity: ErrorSeverity::Info,
        critical: false,
    },
);

impl<E> From<ResilienceError> for ExecutionError<E> {
    fn from(err: ResilienceError) -> Self {
        Self::InvalidConfiguration { message: err.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorClassification;
    use crate::resilience::classify::{ErrorClassifier, OperationFailure};

    #[test]
    fn test_timeout_message_and_code() {
        let err: ExecutionError<OperationFailure> = ExecutionError::TimedOut {
            operation: "sync".into(),
            after: Duration::from_millis(250),
        };

        assert_eq!(err.to_string(), "Operation timed out after 250ms");
        assert!(err.is_timeout());
        assert_eq!(err.code().as_deref(), Some(TIMEOUT_CODE));
        assert!(ErrorClassifier::default().is_retryable(&err));
    }

    #[test]
    fn test_operation_error_is_transparent() {
        let err = ExecutionError::Operation(OperationFailure::network("socket closed"));

        assert_eq!(err.to_string(), "socket closed");
        assert_eq!(err.kind(), "NetworkError");
        let message = err.operation_error().map(ToString::to_string);
        assert_eq!(message.as_deref(), Some("socket closed"));
        assert!(err.into_operation_error().is_some());
    }

    #[test]
    fn test_resilience_error_classification() {
        let err = ResilienceError::DeadLetterNotFound { id: "dlq_x".into() };
        assert!(!err.is_retryable());
        assert_eq!(err.severity(), ErrorSeverity::Info);

        let err: ResilienceError = CommonError::timeout("load", Duration::from_secs(1)).into();
        assert!(err.is_retryable());
    }

    #[test]
    fn test_resilience_error_converts_into_execution_error() {
        let err: ExecutionError<String> = ResilienceError::missing_delay_fn().into();
        assert!(matches!(err, ExecutionError::InvalidConfiguration { .. }));
        assert!(err.to_string().contains("delay function"));
    }
}

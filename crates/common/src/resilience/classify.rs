//! Failure description and retry classification
//!
//! Every error that flows through a [`RetryExecutor`](super::RetryExecutor)
//! describes itself through the [`Failure`] trait: a short *kind* label
//! (used as the key of the error-type tally), an optional machine *code* and
//! its `Display` message. The default retry decision is made by an
//! [`ErrorClassifier`], which matches those three against two label tables:
//!
//! | Table | Labels |
//! |-------|--------|
//! | retryable | `ECONNRESET`, `ENOTFOUND`, `ECONNREFUSED`, `ETIMEDOUT`, `ECONNABORTED`, `NETWORK_ERROR`, `TIMEOUT_ERROR` |
//! | non-retryable | `UNAUTHORIZED`, `FORBIDDEN`, `AUTHENTICATION_ERROR`, `INVALID_TOKEN`, `ACCESS_DENIED` |
//!
//! A label matches when the message or the kind contains it, or when the code
//! equals it. A failure is retryable iff it matches a retryable label and no
//! non-retryable label. Matching is case-sensitive.

use std::borrow::Cow;
use std::fmt;
use std::io;

use serde::{Deserialize, Serialize};

use crate::error::CommonError;

/// Code carried by per-attempt timeouts
pub const TIMEOUT_CODE: &str = "TIMEOUT_ERROR";

/// Code for retryable backend/network failures
pub const NETWORK_CODE: &str = "NETWORK_ERROR";

/// Labels treated as transient by the default classifier
pub const DEFAULT_RETRYABLE_LABELS: &[&str] = &[
    "ECONNRESET",
    "ENOTFOUND",
    "ECONNREFUSED",
    "ETIMEDOUT",
    "ECONNABORTED",
    NETWORK_CODE,
    TIMEOUT_CODE,
];

/// Labels that are never retried by the default classifier
pub const DEFAULT_NON_RETRYABLE_LABELS: &[&str] =
    &["UNAUTHORIZED", "FORBIDDEN", "AUTHENTICATION_ERROR", "INVALID_TOKEN", "ACCESS_DENIED"];

/// An error that can be classified, tallied and dead-lettered
pub trait Failure: fmt::Display + fmt::Debug + Send + Sync {
    /// Short label for the kind of failure (e.g. `"ConnectionReset"`)
    fn kind(&self) -> Cow<'_, str>;

    /// Optional machine-readable code (e.g. `"ECONNRESET"`)
    fn code(&self) -> Option<Cow<'_, str>> {
        None
    }
}

/// Owned, serializable copy of a failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureSnapshot {
    /// Failure label, see [`Failure::kind`]
    pub kind: String,
    /// Display text of the failure
    pub message: String,
    /// Machine-readable code, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl FailureSnapshot {
    /// Capture kind, message and code of any failure
    pub fn of(failure: &dyn Failure) -> Self {
        Self {
            kind: failure.kind().into_owned(),
            message: failure.to_string(),
            code: failure.code().map(Cow::into_owned),
        }
    }
}

impl fmt::Display for FailureSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl Failure for FailureSnapshot {
    fn kind(&self) -> Cow<'_, str> {
        Cow::Borrowed(&self.kind)
    }

    fn code(&self) -> Option<Cow<'_, str>> {
        self.code.as_deref().map(Cow::Borrowed)
    }
}

/// General-purpose operation error for callers without their own error type
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct OperationFailure {
    kind: String,
    message: String,
    code: Option<String>,
}

impl OperationFailure {
    /// Create a failure with the given kind label and message
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self { kind: kind.into(), message: message.into(), code: None }
    }

    /// Attach a machine-readable code
    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Transient network failure (`NETWORK_ERROR`)
    pub fn network(message: impl Into<String>) -> Self {
        Self::new("NetworkError", message).with_code(NETWORK_CODE)
    }

    /// Authentication/authorization failure (`UNAUTHORIZED`)
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("AuthError", message).with_code("UNAUTHORIZED")
    }
}

impl Failure for OperationFailure {
    fn kind(&self) -> Cow<'_, str> {
        Cow::Borrowed(&self.kind)
    }

    fn code(&self) -> Option<Cow<'_, str>> {
        self.code.as_deref().map(Cow::Borrowed)
    }
}

impl Failure for io::Error {
    fn kind(&self) -> Cow<'_, str> {
        Cow::Owned(format!("{:?}", io::Error::kind(self)))
    }

    fn code(&self) -> Option<Cow<'_, str>> {
        let code = match io::Error::kind(self) {
            io::ErrorKind::ConnectionReset => "ECONNRESET",
            io::ErrorKind::ConnectionRefused => "ECONNREFUSED",
            io::ErrorKind::ConnectionAborted => "ECONNABORTED",
            io::ErrorKind::TimedOut => "ETIMEDOUT",
            io::ErrorKind::PermissionDenied => "ACCESS_DENIED",
            _ => return None,
        };
        Some(Cow::Borrowed(code))
    }
}

impl Failure for CommonError {
    fn kind(&self) -> Cow<'_, str> {
        Cow::Borrowed(self.error_type_name())
    }

    fn code(&self) -> Option<Cow<'_, str>> {
        match self {
            Self::Timeout { .. } => Some(Cow::Borrowed(TIMEOUT_CODE)),
            Self::Backend { is_retryable: true, .. } => Some(Cow::Borrowed(NETWORK_CODE)),
            Self::Unauthorized { .. } => Some(Cow::Borrowed("UNAUTHORIZED")),
            _ => None,
        }
    }
}

impl Failure for String {
    fn kind(&self) -> Cow<'_, str> {
        Cow::Borrowed("Error")
    }
}

impl Failure for &'static str {
    fn kind(&self) -> Cow<'_, str> {
        Cow::Borrowed("Error")
    }
}

/// Table-driven retry classifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorClassifier {
    retryable: Vec<Cow<'static, str>>,
    non_retryable: Vec<Cow<'static, str>>,
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self {
            retryable: DEFAULT_RETRYABLE_LABELS.iter().map(|l| Cow::Borrowed(*l)).collect(),
            non_retryable: DEFAULT_NON_RETRYABLE_LABELS.iter().map(|l| Cow::Borrowed(*l)).collect(),
        }
    }
}

impl ErrorClassifier {
    /// Classifier with both tables empty (never retries)
    pub fn empty() -> Self {
        Self { retryable: Vec::new(), non_retryable: Vec::new() }
    }

    /// Add a label to the retryable table
    #[must_use]
    pub fn with_retryable(mut self, label: impl Into<Cow<'static, str>>) -> Self {
        self.retryable.push(label.into());
        self
    }

    /// Add a label to the non-retryable table
    #[must_use]
    pub fn with_non_retryable(mut self, label: impl Into<Cow<'static, str>>) -> Self {
        self.non_retryable.push(label.into());
        self
    }

    /// Labels that make a failure retryable
    pub fn retryable_labels(&self) -> impl Iterator<Item = &str> {
        self.retryable.iter().map(|label| &**label)
    }

    /// Labels that make a failure terminal; these win over retryable ones
    pub fn non_retryable_labels(&self) -> impl Iterator<Item = &str> {
        self.non_retryable.iter().map(|label| &**label)
    }

    /// Decide whether `failure` is worth another attempt
    pub fn is_retryable(&self, failure: &dyn Failure) -> bool {
        let message = failure.to_string();
        let kind = failure.kind();
        let code = failure.code();
        let matches = |label: &str| {
            message.contains(label) || kind.contains(label) || code.as_deref() == Some(label)
        };

        if self.non_retryable.iter().any(|label| matches(&**label)) {
            return false;
        }
        self.retryable.iter().any(|label| matches(&**label))
    }
}

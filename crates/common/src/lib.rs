//! Retry, fallback and dead-letter resilience engine shared across Rampart
//! crates.
//!
//! # Feature Tiers
//!
//! Enable cargo features to opt into the tiers you need:
//! - `foundation`: errors, failure classification, backoff math, retry
//!   configuration, serde helpers
//! - `runtime` (default): tokio-based executor, fallbacks, dead letters,
//!   metrics, events, registry
//! - `test-utils`: scripted operations for tests and benchmarks

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

// Foundation tier
// -----------------------------------------------------------------
#[cfg(feature = "foundation")]
pub mod error;
#[cfg(feature = "foundation")]
pub mod resilience;
#[cfg(feature = "foundation")]
pub mod utils;

// Testing utilities
// ---------------------------------------------------------------
#[cfg(all(feature = "runtime", any(feature = "test-utils", test)))]
pub mod testing;

// Re-export commonly used types and traits for convenience
// ------------------------
#[cfg(feature = "foundation")]
pub use error::{CommonError, CommonResult, ErrorClassification, ErrorSeverity};
#[cfg(feature = "foundation")]
pub use resilience::{
    BackoffStrategy, ErrorClassifier, ExecutionError, Failure, FailureSnapshot, OperationFailure,
    ResilienceError, ResilienceResult, RetryConfig, RetryConfigBuilder, RetrySettings,
};
#[cfg(feature = "runtime")]
pub use resilience::{
    with_retry, DeadLetterRecord, ExecutorRegistry, Fallback, RetryEvent, RetryExecutor,
    RetryMetricsSnapshot, RetryOutcome,
};
#[cfg(feature = "foundation")]
pub use utils::serde::duration_millis;

//! Retry, fallback and dead-letter resilience engine
//!
//! A [`RetryExecutor`] hardens calls to unreliable dependencies:
//!
//! - **Retry**: up to `max_attempts` tries with exponential, linear, fixed or
//!   custom backoff, optional ±10% jitter and an optional per-attempt timeout.
//! - **Classification**: errors describe themselves through [`Failure`]; the
//!   default [`ErrorClassifier`] retries transient network codes and never
//!   retries authentication/permission failures. A custom predicate replaces
//!   it entirely.
//! - **Fallbacks**: a priority-ordered [`FallbackChain`] tried once the retry
//!   phase fails.
//! - **Dead letters**: operations that fail everything are kept (closure
//!   included) in a bounded [`DeadLetterStore`] and can be replayed.
//! - **Observability**: per-executor [`MetricsCollector`] snapshots and
//!   [`RetryEvent`] notifications over a broadcast channel.
//!
//! Executors are shared by name through an explicit [`ExecutorRegistry`].
//!
//! ```rust,ignore
//! let registry = ExecutorRegistry::new();
//! let config = registry.config("crm.contacts").max_attempts(5).build()?;
//! let executor = registry.get_or_create::<Contact, OperationFailure>(config)?;
//! executor.add_fallback(Fallback::new("cache", 10, || async { cached_contact().await }));
//!
//! let outcome = executor.execute(|| async { fetch_contact().await }).await;
//! ```
//!
//! ## Module layout
//!
//! | Module | Tier | Contents |
//! |--------|------|----------|
//! | `classify` | foundation | `Failure`, `FailureSnapshot`, `ErrorClassifier` |
//! | `backoff` | foundation | delay computation and jitter |
//! | `config` | foundation | `RetrySettings`, `RetryConfig` and its builder |
//! | `error` | foundation | `ExecutionError`, `ResilienceError` |
//! | `events` | runtime | `RetryEvent`, `EventBus` |
//! | `fallback` | runtime | `Fallback`, `FallbackChain` |
//! | `dead_letter` | runtime | `DeadLetterStore` and its records |
//! | `metrics` | runtime | `MetricsCollector`, `RetryMetricsSnapshot` |
//! | `executor` | runtime | `RetryExecutor`, `RetryOutcome` |
//! | `registry` | runtime | `ExecutorRegistry`, `with_retry` |

pub mod backoff;
pub mod classify;
pub mod config;
pub mod error;

#[cfg(feature = "runtime")]
pub mod dead_letter;
#[cfg(feature = "runtime")]
pub mod events;
#[cfg(feature = "runtime")]
pub mod executor;
#[cfg(feature = "runtime")]
pub mod fallback;
#[cfg(feature = "runtime")]
pub mod metrics;
#[cfg(feature = "runtime")]
pub mod registry;

pub use backoff::{BackoffStrategy, DelayFn, JITTER_RATIO};
pub use classify::{
    ErrorClassifier, Failure, FailureSnapshot, OperationFailure, DEFAULT_NON_RETRYABLE_LABELS,
    DEFAULT_RETRYABLE_LABELS,
};
pub use config::{RetryCondition, RetryConfig, RetryConfigBuilder, RetrySettings};
#[cfg(feature = "runtime")]
pub use dead_letter::{
    DeadLetterMetadata, DeadLetterRecord, DeadLetterStore, DEAD_LETTER_CAPACITY,
    DEAD_LETTER_RETAIN,
};
pub use error::{ExecutionError, ResilienceError, ResilienceResult};
#[cfg(feature = "runtime")]
pub use events::{EventBus, RetryEvent};
#[cfg(feature = "runtime")]
pub use executor::{OperationFn, RetryExecutor, RetryOutcome};
#[cfg(feature = "runtime")]
pub use fallback::{Fallback, FallbackChain, FallbackSuccess};
#[cfg(feature = "runtime")]
pub use metrics::{MetricsCollector, RetryMetricsSnapshot};
#[cfg(feature = "runtime")]
pub use registry::{with_retry, ExecutorRegistry};

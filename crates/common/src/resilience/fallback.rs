//! Prioritized fallback handlers
//!
//! When the retry phase of an executor fails, its [`FallbackChain`] is tried
//! in descending priority (ties keep registration order). A fallback may be
//! restricted to certain terminal errors with [`Fallback::when`] and bounded
//! with its own [`Fallback::with_timeout`]. The first fallback that succeeds
//! wins; failed fallbacks are logged, published and skipped.

use std::cmp::Reverse;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::{BoxFuture, FutureExt};
use parking_lot::RwLock;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::classify::{Failure, FailureSnapshot};
use super::error::ExecutionError;
use super::events::{EventBus, RetryEvent};

type Handler<T, E> = Arc<dyn Fn() -> BoxFuture<'static, Result<T, E>> + Send + Sync>;
type Condition<E> = Arc<dyn Fn(&ExecutionError<E>) -> bool + Send + Sync>;

/// Alternate producer of an executor's result
pub struct Fallback<T, E> {
    name: String,
    priority: i32,
    handler: Handler<T, E>,
    condition: Option<Condition<E>>,
    timeout: Option<Duration>,
}

impl<T, E> Clone for Fallback<T, E> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            priority: self.priority,
            handler: Arc::clone(&self.handler),
            condition: self.condition.clone(),
            timeout: self.timeout,
        }
    }
}

impl<T, E> fmt::Debug for Fallback<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fallback")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("conditional", &self.condition.is_some())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl<T, E> Fallback<T, E> {
    /// Create a fallback; higher `priority` runs first
    pub fn new<F, Fut>(name: impl Into<String>, priority: i32, handler: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        Self {
            name: name.into(),
            priority,
            handler: Arc::new(move || handler().boxed()),
            condition: None,
            timeout: None,
        }
    }

    /// Only run this fallback when `condition` accepts the terminal error
    #[must_use]
    pub fn when<P>(mut self, condition: P) -> Self
    where
        P: Fn(&ExecutionError<E>) -> bool + Send + Sync + 'static,
    {
        self.condition = Some(Arc::new(condition));
        self
    }

    /// Bound each run of this fallback by `timeout`
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Unique name within a chain
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Higher runs first
    pub const fn priority(&self) -> i32 {
        self.priority
    }

    /// Own timeout, if any
    pub const fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    fn applies_to(&self, error: &ExecutionError<E>) -> bool {
        self.condition.as_ref().map_or(true, |condition| condition(error))
    }
}

/// Result produced by a fallback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackSuccess<T> {
    /// Value the fallback produced
    pub value: T,
    /// Name of the fallback
    pub fallback: String,
    /// Time the fallback took
    pub duration: Duration,
}

/// Priority-ordered set of fallbacks
pub struct FallbackChain<T, E> {
    entries: RwLock<Vec<Fallback<T, E>>>,
}

impl<T, E> Default for FallbackChain<T, E> {
    fn default() -> Self {
        Self { entries: RwLock::new(Vec::new()) }
    }
}

impl<T, E> fmt::Debug for FallbackChain<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.entries.read().iter()).finish()
    }
}

impl<T, E> FallbackChain<T, E> {
    /// Empty chain
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fallback, replacing any existing one with the same name
    pub fn add(&self, fallback: Fallback<T, E>) {
        let mut entries = self.entries.write();
        entries.retain(|existing| existing.name != fallback.name);
        entries.push(fallback);
        // stable: equal priorities keep registration order
        entries.sort_by_key(|entry| Reverse(entry.priority));
    }

    /// Remove the fallback named `name`; returns whether one was removed
    pub fn remove(&self, name: &str) -> bool {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|existing| existing.name != name);
        entries.len() != before
    }

    /// Fallback names in the order they would run
    pub fn names(&self) -> Vec<String> {
        self.entries.read().iter().map(|entry| entry.name.clone()).collect()
    }

    /// Number of registered fallbacks
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether no fallback is registered
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl<T, E> FallbackChain<T, E>
where
    T: Send + 'static,
    E: Failure + 'static,
{
    /// Try the fallbacks for the terminal `error` of executor `executor`
    ///
    /// Returns `None` when no fallback applies or all of them fail.
    pub async fn run(
        &self,
        executor: &str,
        error: &ExecutionError<E>,
        events: &EventBus,
    ) -> Option<FallbackSuccess<T>> {
        let entries = self.entries.read().clone();

        for fallback in entries {
            if !fallback.applies_to(error) {
                debug!(executor, fallback = %fallback.name, "Fallback condition not met, skipping");
                continue;
            }

            let started = Instant::now();
            let result = match fallback.timeout {
                Some(limit) => match tokio::time::timeout(limit, (fallback.handler)()).await {
                    Ok(result) => result.map_err(ExecutionError::Operation),
                    Err(_) => Err(ExecutionError::TimedOut {
                        operation: fallback.name.clone(),
                        after: limit,
                    }),
                },
                None => (fallback.handler)().await.map_err(ExecutionError::Operation),
            };
            let duration = started.elapsed();

            match result {
                Ok(value) => {
                    info!(
                        executor,
                        fallback = %fallback.name,
                        duration_ms = duration.as_millis() as u64,
                        "Fallback succeeded"
                    );
                    events.publish(RetryEvent::FallbackSuccess {
                        executor: executor.to_string(),
                        fallback: fallback.name.clone(),
                        duration,
                        timestamp: Utc::now(),
                    });
                    return Some(FallbackSuccess { value, fallback: fallback.name, duration });
                }
                Err(fallback_error) => {
                    warn!(
                        executor,
                        fallback = %fallback.name,
                        error = %fallback_error,
                        "Fallback failed"
                    );
                    events.publish(RetryEvent::FallbackFailed {
                        executor: executor.to_string(),
                        fallback: fallback.name.clone(),
                        error: FailureSnapshot::of(&fallback_error),
                        timestamp: Utc::now(),
                    });
                }
            }
        }

        None
    }
}

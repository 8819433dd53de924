//! Retry executor: attempt loop, fallbacks and dead-lettering
//!
//! [`RetryExecutor::execute`] runs an operation up to `max_attempts` times,
//! sleeping between attempts according to the configured backoff. When the
//! retry phase fails (attempts exhausted or the retry condition rejects the
//! error) the executor's [`FallbackChain`] is tried; if no fallback succeeds
//! the operation is stored in the [`DeadLetterStore`] and the original error
//! is returned inside the [`RetryOutcome`].
//!
//! `execute` never fails at the Rust level: the outcome carries the result,
//! the attempt count and the retry-phase duration, plus which fallback (if
//! any) produced the value.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::{BoxFuture, FutureExt};
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};

use super::classify::{Failure, FailureSnapshot};
use super::config::RetryConfig;
use super::dead_letter::{DeadLetterMetadata, DeadLetterRecord, DeadLetterStore};
use super::error::{ExecutionError, ResilienceError, ResilienceResult};
use super::events::{EventBus, RetryEvent};
use super::fallback::{Fallback, FallbackChain};
use super::metrics::{MetricsCollector, RetryMetricsSnapshot};

/// Type-erased, re-invocable operation
pub type OperationFn<T, E> = Arc<dyn Fn() -> BoxFuture<'static, Result<T, E>> + Send + Sync>;

/// Outcome of one `execute()` call
#[derive(Debug)]
pub struct RetryOutcome<T, E> {
    /// Value from the operation or a fallback, or the original terminal error
    pub result: Result<T, ExecutionError<E>>,
    /// Attempts made in the retry phase
    pub attempts: u32,
    /// Duration of the retry phase (fallback time excluded)
    pub total_duration: Duration,
    /// Whether a fallback produced the value
    pub from_fallback: bool,
    /// Name of the fallback that produced the value
    pub fallback_used: Option<String>,
    /// Time spent in the successful fallback
    pub fallback_duration: Option<Duration>,
    /// Id of the dead letter created for this call, if any
    pub dead_letter_id: Option<String>,
}

impl<T, E> RetryOutcome<T, E> {
    /// Whether the call produced a value, from a fallback or not
    pub const fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    /// Consume the outcome and return only the result
    pub fn into_result(self) -> Result<T, ExecutionError<E>> {
        self.result
    }

    /// Borrow the value, if any
    pub fn value(&self) -> Option<&T> {
        self.result.as_ref().ok()
    }

    /// Borrow the terminal error, if any
    pub fn error(&self) -> Option<&ExecutionError<E>> {
        self.result.as_ref().err()
    }
}

struct RetryPhase<T, E> {
    result: Result<T, ExecutionError<E>>,
    attempts: u32,
    duration: Duration,
}

/// Named executor owning its fallbacks, dead letters, metrics and events
pub struct RetryExecutor<T, E> {
    config: RetryConfig,
    fallbacks: FallbackChain<T, E>,
    dead_letters: DeadLetterStore<T, E>,
    metrics: Arc<MetricsCollector>,
    events: EventBus,
}

impl<T, E> fmt::Debug for RetryExecutor<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryExecutor")
            .field("config", &self.config)
            .field("fallbacks", &self.fallbacks.names())
            .field("dead_letters", &self.dead_letters.len())
            .finish_non_exhaustive()
    }
}

impl<T, E> RetryExecutor<T, E> {
    /// Create an executor; fails if `config` does not validate
    pub fn new(config: RetryConfig) -> ResilienceResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            fallbacks: FallbackChain::new(),
            dead_letters: DeadLetterStore::new(),
            metrics: Arc::new(MetricsCollector::new()),
            events: EventBus::new(),
        })
    }

    /// Executor name, shared with its registry entry
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Configuration the executor was built with
    pub const fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Register a fallback (replaces one with the same name)
    pub fn add_fallback(&self, fallback: Fallback<T, E>) {
        debug!(
            executor = %self.config.name,
            fallback = %fallback.name(),
            priority = fallback.priority(),
            "Fallback registered"
        );
        self.fallbacks.add(fallback);
    }

    /// Unregister fallback `name`; returns whether it existed
    pub fn remove_fallback(&self, name: &str) -> bool {
        self.fallbacks.remove(name)
    }

    /// Fallback names in run order
    pub fn fallback_names(&self) -> Vec<String> {
        self.fallbacks.names()
    }

    /// Dead letters in insertion order
    pub fn dead_letters(&self) -> Vec<DeadLetterRecord> {
        self.dead_letters.list()
    }

    /// Look up one dead letter by id
    pub fn dead_letter(&self, id: &str) -> Option<DeadLetterRecord> {
        self.dead_letters.get(id)
    }

    /// Drop all dead letters, returning how many were removed
    pub fn clear_dead_letters(&self) -> usize {
        self.dead_letters.clear()
    }

    /// Current metrics snapshot
    pub fn metrics(&self) -> RetryMetricsSnapshot {
        self.metrics.snapshot()
    }

    pub(crate) fn metrics_handle(&self) -> Arc<MetricsCollector> {
        Arc::clone(&self.metrics)
    }

    /// Zero counters and maps; fallbacks and dead letters are untouched
    pub fn reset_metrics(&self) {
        self.metrics.reset();
    }

    /// Receive every event published from now on
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<RetryEvent> {
        self.events.subscribe()
    }
}

impl<T, E> RetryExecutor<T, E>
where
    T: Send + 'static,
    E: Failure + 'static,
{
    /// Execute `operation` described by the executor name
    pub async fn execute<F, Fut>(&self, operation: F) -> RetryOutcome<T, E>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let descriptor = self.config.name.clone();
        self.execute_described(descriptor, operation).await
    }

    /// Execute `operation`, recording `descriptor` if it is dead-lettered
    #[instrument(skip_all, fields(executor = %self.config.name))]
    pub async fn execute_described<F, Fut>(
        &self,
        descriptor: impl Into<String> + Send,
        operation: F,
    ) -> RetryOutcome<T, E>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let descriptor = descriptor.into();
        let operation: OperationFn<T, E> = Arc::new(move || operation().boxed());

        let mut outcome = self.run_pipeline(&descriptor, &operation).await;
        if let Err(err) = &outcome.result {
            let id = self.store_dead_letter(&descriptor, operation, err, outcome.attempts);
            outcome.dead_letter_id = Some(id);
        }
        outcome
    }

    /// Re-run dead letter `id` through the full retry and fallback pipeline
    ///
    /// No new dead letter is created. On success the entry is removed; on
    /// failure it stays with its attempt count, error and `last_attempt_at`
    /// updated.
    #[instrument(skip(self), fields(executor = %self.config.name))]
    pub async fn replay_dead_letter(&self, id: &str) -> ResilienceResult<RetryOutcome<T, E>> {
        let (descriptor, operation) = self
            .dead_letters
            .operation(id)
            .ok_or_else(|| ResilienceError::DeadLetterNotFound { id: id.to_string() })?;

        info!(executor = %self.config.name, id, operation = %descriptor, "Replaying dead letter");
        let outcome = self.run_pipeline(&descriptor, &operation).await;

        match &outcome.result {
            Ok(_) => {
                self.dead_letters.remove(id);
                info!(executor = %self.config.name, id, "Dead letter replay succeeded");
            }
            Err(err) => {
                let snapshot = FailureSnapshot::of(err);
                self.dead_letters.record_failed_replay(id, outcome.attempts, snapshot);
                warn!(executor = %self.config.name, id, error = %err, "Dead letter replay failed");
            }
        }
        self.events.publish(RetryEvent::DeadLetterReplayed {
            executor: self.config.name.clone(),
            id: id.to_string(),
            succeeded: outcome.is_success(),
            timestamp: Utc::now(),
        });

        Ok(outcome)
    }

    async fn run_pipeline(
        &self,
        descriptor: &str,
        operation: &OperationFn<T, E>,
    ) -> RetryOutcome<T, E> {
        let name = &self.config.name;
        self.events.publish(RetryEvent::OperationStart {
            executor: name.clone(),
            operation: descriptor.to_string(),
            timestamp: Utc::now(),
        });

        let phase = self.retry_phase(descriptor, operation).await;
        let error = match phase.result {
            Ok(value) => {
                self.metrics.record_completion(phase.attempts, phase.duration, true);
                self.events.publish(RetryEvent::OperationSuccess {
                    executor: name.clone(),
                    operation: descriptor.to_string(),
                    attempts: phase.attempts,
                    duration: phase.duration,
                    timestamp: Utc::now(),
                });
                return RetryOutcome {
                    result: Ok(value),
                    attempts: phase.attempts,
                    total_duration: phase.duration,
                    from_fallback: false,
                    fallback_used: None,
                    fallback_duration: None,
                    dead_letter_id: None,
                };
            }
            Err(error) => error,
        };

        self.metrics.record_exhausted();
        error!(
            executor = %name,
            operation = %descriptor,
            attempts = phase.attempts,
            error = %error,
            "Retry phase failed"
        );
        self.events.publish(RetryEvent::OperationFailed {
            executor: name.clone(),
            operation: descriptor.to_string(),
            attempts: phase.attempts,
            error: FailureSnapshot::of(&error),
            timestamp: Utc::now(),
        });

        if let Some(success) = self.fallbacks.run(name, &error, &self.events).await {
            self.metrics.record_fallback_use(&success.fallback);
            self.metrics.record_completion(phase.attempts, phase.duration, false);
            return RetryOutcome {
                result: Ok(success.value),
                attempts: phase.attempts,
                total_duration: phase.duration,
                from_fallback: true,
                fallback_used: Some(success.fallback),
                fallback_duration: Some(success.duration),
                dead_letter_id: None,
            };
        }

        self.metrics.record_completion(phase.attempts, phase.duration, false);

        RetryOutcome {
            result: Err(error),
            attempts: phase.attempts,
            total_duration: phase.duration,
            from_fallback: false,
            fallback_used: None,
            fallback_duration: None,
            dead_letter_id: None,
        }
    }

    async fn retry_phase(
        &self,
        descriptor: &str,
        operation: &OperationFn<T, E>,
    ) -> RetryPhase<T, E> {
        let name = &self.config.name;
        let max_attempts = self.config.settings.max_attempts;
        let started = Instant::now();
        let mut attempt = 0;

        loop {
            attempt += 1;
            self.metrics.record_attempt();
            debug!(
                executor = %name,
                operation = %descriptor,
                attempt,
                max_attempts,
                "Executing attempt"
            );

            let error = match self.attempt_once(descriptor, operation).await {
                Ok(value) => {
                    if attempt > 1 {
                        self.metrics.record_retry_success();
                        info!(
                            executor = %name,
                            operation = %descriptor,
                            attempt,
                            "Operation succeeded after retry"
                        );
                    }
                    return RetryPhase {
                        result: Ok(value),
                        attempts: attempt,
                        duration: started.elapsed(),
                    };
                }
                Err(error) => error,
            };

            self.metrics.record_error(&error.kind());

            let exhausted = attempt >= max_attempts;
            let retry = !exhausted && self.config.should_retry(&error);
            let next_delay = if retry {
                match self.config.delay_for(attempt) {
                    Ok(delay) => Some(delay),
                    Err(config_error) => {
                        error!(
                            executor = %name,
                            error = %config_error,
                            "Cannot compute retry delay"
                        );
                        self.publish_attempt_failed(descriptor, attempt, &error, None);
                        return RetryPhase {
                            result: Err(config_error.into()),
                            attempts: attempt,
                            duration: started.elapsed(),
                        };
                    }
                }
            } else {
                None
            };

            self.publish_attempt_failed(descriptor, attempt, &error, next_delay);

            let Some(delay) = next_delay else {
                if exhausted {
                    warn!(
                        executor = %name,
                        operation = %descriptor,
                        attempts = attempt,
                        error = %error,
                        "All retry attempts exhausted"
                    );
                } else {
                    warn!(
                        executor = %name,
                        operation = %descriptor,
                        attempt,
                        error = %error,
                        "Error is not retryable"
                    );
                }
                return RetryPhase {
                    result: Err(error),
                    attempts: attempt,
                    duration: started.elapsed(),
                };
            };

            warn!(
                executor = %name,
                operation = %descriptor,
                attempt,
                max_attempts,
                error = %error,
                delay_ms = delay.as_millis() as u64,
                "Attempt failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn attempt_once(
        &self,
        descriptor: &str,
        operation: &OperationFn<T, E>,
    ) -> Result<T, ExecutionError<E>> {
        let attempt = operation();
        match self.config.settings.attempt_timeout {
            Some(limit) => match tokio::time::timeout(limit, attempt).await {
                Ok(result) => result.map_err(ExecutionError::Operation),
                Err(_) => Err(ExecutionError::TimedOut {
                    operation: descriptor.to_string(),
                    after: limit,
                }),
            },
            None => attempt.await.map_err(ExecutionError::Operation),
        }
    }

    fn publish_attempt_failed(
        &self,
        descriptor: &str,
        attempt: u32,
        error: &ExecutionError<E>,
        next_delay: Option<Duration>,
    ) {
        self.events.publish(RetryEvent::AttemptFailed {
            executor: self.config.name.clone(),
            operation: descriptor.to_string(),
            attempt,
            error: FailureSnapshot::of(error),
            next_delay,
            timestamp: Utc::now(),
        });
    }

    fn store_dead_letter(
        &self,
        descriptor: &str,
        operation: OperationFn<T, E>,
        error: &ExecutionError<E>,
        attempts: u32,
    ) -> String {
        let snapshot = FailureSnapshot::of(error);
        let metadata = DeadLetterMetadata {
            executor: self.config.name.clone(),
            settings: self.config.settings.clone(),
            replay_count: 0,
        };
        let id = self.dead_letters.add(descriptor, operation, snapshot.clone(), attempts, metadata);
        self.metrics.record_dead_letter();

        error!(
            executor = %self.config.name,
            id = %id,
            operation = %descriptor,
            attempts,
            "Operation dead-lettered"
        );
        self.events.publish(RetryEvent::DeadLetterAdded {
            executor: self.config.name.clone(),
            id: id.clone(),
            operation: descriptor.to_string(),
            error: snapshot,
            timestamp: Utc::now(),
        });
        id
    }
}

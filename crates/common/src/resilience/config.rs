//! Retry configuration
//!
//! [`RetrySettings`] is the plain-data part of a configuration (what can be
//! read from a file or compared between registry callers). [`RetryConfig`]
//! adds the executor name, the optional custom delay function and the retry
//! condition. Build one with [`RetryConfig::builder`]; `build()` validates.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::backoff::{self, BackoffStrategy, DelayFn};
use super::classify::{ErrorClassifier, Failure};
use super::error::{ResilienceError, ResilienceResult};

/// Default number of tries, first attempt included
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
/// Default delay before the first retry
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(1_000);
/// Default cap for computed delays
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(30_000);
/// Default exponential multiplier
pub const DEFAULT_BACKOFF_FACTOR: f64 = 2.0;

/// Serializable retry parameters
///
/// Durations are (de)serialized as milliseconds (`initial_delay_ms`,
/// `max_delay_ms`, `attempt_timeout_ms`). Missing fields take the defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Total tries including the first
    pub max_attempts: u32,
    /// Delay after the first failed attempt
    #[serde(rename = "initial_delay_ms", with = "crate::utils::serde::duration_millis")]
    pub initial_delay: Duration,
    /// Upper bound for exponential and linear delays
    #[serde(rename = "max_delay_ms", with = "crate::utils::serde::duration_millis")]
    pub max_delay: Duration,
    /// How delays grow between attempts
    pub strategy: BackoffStrategy,
    /// Exponential multiplier; values below 1 shrink the delay
    pub backoff_factor: f64,
    /// Apply ±10% random jitter to each delay
    pub jitter: bool,
    /// Upper bound for a single attempt
    #[serde(
        rename = "attempt_timeout_ms",
        with = "crate::utils::serde::option_duration_millis",
        skip_serializing_if = "Option::is_none"
    )]
    pub attempt_timeout: Option<Duration>,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_delay: DEFAULT_INITIAL_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            strategy: BackoffStrategy::Exponential,
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
            jitter: true,
            attempt_timeout: None,
        }
    }
}

impl RetrySettings {
    /// Check the parameters that can be checked without a delay function
    pub fn validate(&self) -> ResilienceResult<()> {
        if self.max_attempts == 0 {
            return Err(ResilienceError::invalid_config("max_attempts must be greater than 0"));
        }
        Ok(())
    }
}

/// Predicate deciding whether a failed attempt is retried
#[derive(Clone)]
pub enum RetryCondition {
    /// Label-table classification (the default)
    Classifier(ErrorClassifier),
    /// Caller-supplied predicate; fully replaces the classifier
    Custom(Arc<dyn Fn(&dyn Failure) -> bool + Send + Sync>),
}

impl RetryCondition {
    /// Whether `failure` deserves another attempt
    pub fn should_retry(&self, failure: &dyn Failure) -> bool {
        match self {
            Self::Classifier(classifier) => classifier.is_retryable(failure),
            Self::Custom(predicate) => predicate(failure),
        }
    }
}

impl Default for RetryCondition {
    fn default() -> Self {
        Self::Classifier(ErrorClassifier::default())
    }
}

impl fmt::Debug for RetryCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Classifier(classifier) => f.debug_tuple("Classifier").field(classifier).finish(),
            Self::Custom(_) => f.debug_tuple("Custom").field(&"<predicate>").finish(),
        }
    }
}

/// Complete configuration of a named executor
#[derive(Clone)]
pub struct RetryConfig {
    /// Logical identifier used for metrics, events and registry lookup
    pub name: String,
    /// Plain, serializable parameters
    pub settings: RetrySettings,
    delay_fn: Option<DelayFn>,
    condition: RetryCondition,
}

impl fmt::Debug for RetryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryConfig")
            .field("name", &self.name)
            .field("settings", &self.settings)
            .field("delay_fn", &self.delay_fn.as_ref().map(|_| "<fn>"))
            .field("condition", &self.condition)
            .finish()
    }
}

impl RetryConfig {
    /// Create a configuration builder for `name` starting from the defaults
    #[allow(clippy::new_ret_no_self)]
    pub fn new(name: impl Into<String>) -> RetryConfigBuilder {
        RetryConfigBuilder::new(name)
    }

    /// Alias for [`RetryConfig::new`]
    pub fn builder(name: impl Into<String>) -> RetryConfigBuilder {
        RetryConfigBuilder::new(name)
    }

    /// Executor name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Plain retry parameters
    pub const fn settings(&self) -> &RetrySettings {
        &self.settings
    }

    /// Decision used for failed attempts
    pub const fn condition(&self) -> &RetryCondition {
        &self.condition
    }

    /// Whether a custom delay function is set
    pub const fn has_delay_fn(&self) -> bool {
        self.delay_fn.is_some()
    }

    /// Validate the configuration
    pub fn validate(&self) -> ResilienceResult<()> {
        self.settings.validate()?;
        if self.settings.strategy == BackoffStrategy::Custom && self.delay_fn.is_none() {
            return Err(ResilienceError::missing_delay_fn());
        }
        Ok(())
    }

    /// Delay to wait after failed attempt `attempt`, jitter included
    pub fn delay_for(&self, attempt: u32) -> ResilienceResult<Duration> {
        let delay = backoff::base_delay(&self.settings, self.delay_fn.as_ref(), attempt)?;
        Ok(if self.settings.jitter { backoff::apply_jitter(delay) } else { delay })
    }

    /// Apply the retry condition to a failed attempt
    pub fn should_retry(&self, failure: &dyn Failure) -> bool {
        self.condition.should_retry(failure)
    }
}

/// Builder for RetryConfig with fluent API
#[derive(Debug)]
pub struct RetryConfigBuilder {
    config: RetryConfig,
}

impl RetryConfigBuilder {
    /// Start from the default settings
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            config: RetryConfig {
                name: name.into(),
                settings: RetrySettings::default(),
                delay_fn: None,
                condition: RetryCondition::default(),
            },
        }
    }

    /// Replace all plain parameters at once (e.g. from a loaded preset)
    pub fn settings(mut self, settings: RetrySettings) -> Self {
        self.config.settings = settings;
        self
    }

    /// Total tries, first attempt included
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.config.settings.max_attempts = attempts;
        self
    }

    /// Delay after the first failed attempt
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.config.settings.initial_delay = delay;
        self
    }

    /// Cap for computed delays
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.config.settings.max_delay = delay;
        self
    }

    /// Backoff strategy; `Custom` also needs [`custom_backoff`](Self::custom_backoff)
    pub fn strategy(mut self, strategy: BackoffStrategy) -> Self {
        self.config.settings.strategy = strategy;
        self
    }

    /// Exponential multiplier
    pub fn backoff_factor(mut self, factor: f64) -> Self {
        self.config.settings.backoff_factor = factor;
        self
    }

    /// Exponential backoff with the given factor
    pub fn exponential_backoff(mut self, initial_delay: Duration, factor: f64) -> Self {
        self.config.settings.strategy = BackoffStrategy::Exponential;
        self.config.settings.initial_delay = initial_delay;
        self.config.settings.backoff_factor = factor;
        self
    }

    /// Linear backoff growing by `initial_delay`
    pub fn linear_backoff(mut self, initial_delay: Duration) -> Self {
        self.config.settings.strategy = BackoffStrategy::Linear;
        self.config.settings.initial_delay = initial_delay;
        self
    }

    /// Same delay between every attempt
    pub fn fixed_backoff(mut self, delay: Duration) -> Self {
        self.config.settings.strategy = BackoffStrategy::Fixed;
        self.config.settings.initial_delay = delay;
        self
    }

    /// Custom backoff: `delay_fn` receives the 1-based number of the failed
    /// attempt
    pub fn custom_backoff<F>(mut self, delay_fn: F) -> Self
    where
        F: Fn(u32) -> Duration + Send + Sync + 'static,
    {
        self.config.settings.strategy = BackoffStrategy::Custom;
        self.config.delay_fn = Some(Arc::new(delay_fn));
        self
    }

    /// Enable or disable jitter
    pub fn jitter(mut self, enabled: bool) -> Self {
        self.config.settings.jitter = enabled;
        self
    }

    /// Exact delays
    pub fn no_jitter(self) -> Self {
        self.jitter(false)
    }

    /// Fail attempts running longer than `timeout`
    pub fn attempt_timeout(mut self, timeout: Duration) -> Self {
        self.config.settings.attempt_timeout = Some(timeout);
        self
    }

    /// Use a custom label table for the default retry decision
    pub fn classifier(mut self, classifier: ErrorClassifier) -> Self {
        self.config.condition = RetryCondition::Classifier(classifier);
        self
    }

    /// Retry only when `predicate` returns true (replaces the classifier)
    pub fn retry_if<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&dyn Failure) -> bool + Send + Sync + 'static,
    {
        self.config.condition = RetryCondition::Custom(Arc::new(predicate));
        self
    }

    /// Validate and finish the configuration
    pub fn build(self) -> ResilienceResult<RetryConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

//! Per-executor retry metrics
//!
//! Hot counters are atomics; the running averages, the per-label maps and the
//! timestamps sit behind a single `parking_lot::Mutex` that is never held
//! across an `.await`.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Default)]
struct Aggregates {
    completed_operations: u64,
    average_attempts: f64,
    average_duration_ms: f64,
    fallback_usage: BTreeMap<String, u64>,
    error_types: BTreeMap<String, u64>,
    last_success: Option<DateTime<Utc>>,
    last_failure: Option<DateTime<Utc>>,
}

/// Running counters and averages for one named executor
#[derive(Debug, Default)]
pub struct MetricsCollector {
    total_attempts: AtomicU64,
    successful_retries: AtomicU64,
    failed_retries: AtomicU64,
    dead_lettered: AtomicU64,
    aggregates: Mutex<Aggregates>,
}

impl MetricsCollector {
    /// Create new metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one iteration of the attempt loop
    pub fn record_attempt(&self) {
        self.total_attempts.fetch_add(1, AtomicOrdering::Relaxed);
    }

    /// Record one failed attempt under its error kind
    pub fn record_error(&self, kind: &str) {
        let mut agg = self.aggregates.lock();
        *agg.error_types.entry(kind.to_string()).or_insert(0) += 1;
    }

    /// Record a success that needed more than one attempt
    pub fn record_retry_success(&self) {
        self.successful_retries.fetch_add(1, AtomicOrdering::Relaxed);
    }

    /// Record a retry phase that ended in failure
    pub fn record_exhausted(&self) {
        self.failed_retries.fetch_add(1, AtomicOrdering::Relaxed);
        self.aggregates.lock().last_failure = Some(Utc::now());
    }

    /// Record a fallback that produced the result
    pub fn record_fallback_use(&self, fallback: &str) {
        let mut agg = self.aggregates.lock();
        *agg.fallback_usage.entry(fallback.to_string()).or_insert(0) += 1;
    }

    /// Record a dead-letter entry
    pub fn record_dead_letter(&self) {
        self.dead_lettered.fetch_add(1, AtomicOrdering::Relaxed);
    }

    /// Fold one finished `execute()` into the running averages
    ///
    /// `attempts` and `duration` cover the retry phase only. `primary_success`
    /// marks operations that succeeded without a fallback.
    pub fn record_completion(&self, attempts: u32, duration: Duration, primary_success: bool) {
        let mut agg = self.aggregates.lock();
        agg.completed_operations += 1;
        let n = agg.completed_operations as f64;
        agg.average_attempts += (f64::from(attempts) - agg.average_attempts) / n;
        agg.average_duration_ms += (duration.as_secs_f64() * 1_000.0 - agg.average_duration_ms) / n;
        if primary_success {
            agg.last_success = Some(Utc::now());
        }
    }

    /// Attempts made so far
    pub fn total_attempts(&self) -> u64 {
        self.total_attempts.load(AtomicOrdering::Relaxed)
    }

    /// Get a snapshot of current metrics
    pub fn snapshot(&self) -> RetryMetricsSnapshot {
        let agg = self.aggregates.lock();
        RetryMetricsSnapshot {
            total_attempts: self.total_attempts.load(AtomicOrdering::Relaxed),
            successful_retries: self.successful_retries.load(AtomicOrdering::Relaxed),
            failed_retries: self.failed_retries.load(AtomicOrdering::Relaxed),
            dead_lettered: self.dead_lettered.load(AtomicOrdering::Relaxed),
            completed_operations: agg.completed_operations,
            average_attempts: agg.average_attempts,
            average_duration_ms: agg.average_duration_ms,
            fallback_usage: agg.fallback_usage.clone(),
            error_types: agg.error_types.clone(),
            last_success: agg.last_success,
            last_failure: agg.last_failure,
        }
    }

    /// Reset all metrics to zero
    pub fn reset(&self) {
        let mut agg = self.aggregates.lock();
        self.total_attempts.store(0, AtomicOrdering::Relaxed);
        self.successful_retries.store(0, AtomicOrdering::Relaxed);
        self.failed_retries.store(0, AtomicOrdering::Relaxed);
        self.dead_lettered.store(0, AtomicOrdering::Relaxed);
        *agg = Aggregates::default();
    }
}

/// Snapshot of retry metrics at a point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryMetricsSnapshot {
    /// Attempts across all operations
    pub total_attempts: u64,
    /// Operations that succeeded on attempt 2 or later
    pub successful_retries: u64,
    /// Retry phases that ended in failure (fallback-rescued included)
    pub failed_retries: u64,
    /// Operations stored as dead letters
    pub dead_lettered: u64,
    /// Finished `execute()` calls and replays
    pub completed_operations: u64,
    /// Mean retry-phase attempts per completed operation
    pub average_attempts: f64,
    /// Mean retry-phase duration in milliseconds
    pub average_duration_ms: f64,
    /// Successful runs per fallback name
    pub fallback_usage: BTreeMap<String, u64>,
    /// Failed attempts per error kind
    pub error_types: BTreeMap<String, u64>,
    /// Last success without a fallback
    pub last_success: Option<DateTime<Utc>>,
    /// Last exhausted retry phase
    pub last_failure: Option<DateTime<Utc>>,
}

impl RetryMetricsSnapshot {
    /// Operations rescued by any fallback
    pub fn fallback_total(&self) -> u64 {
        self.fallback_usage.values().sum()
    }

    /// One-line human readable summary
    pub fn summary(&self) -> String {
        format!(
            "{} ops, {} attempts (avg {:.2}, {:.1}ms), {} retried ok, {} exhausted, {} via fallback, {} dead-lettered",
            self.completed_operations,
            self.total_attempts,
            self.average_attempts,
            self.average_duration_ms,
            self.successful_retries,
            self.failed_retries,
            self.fallback_total(),
            self.dead_lettered,
        )
    }
}

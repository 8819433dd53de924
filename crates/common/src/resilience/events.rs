//! Lifecycle notifications published by executors
//!
//! Every executor owns an [`EventBus`]; observers call
//! [`RetryExecutor::subscribe`](super::RetryExecutor::subscribe) and receive
//! [`RetryEvent`]s in publication order. Slow subscribers that fall more than
//! [`EVENT_CHANNEL_CAPACITY`] events behind observe `RecvError::Lagged`.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::classify::FailureSnapshot;

/// Buffered events per subscriber
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Notification emitted by a [`RetryExecutor`](super::RetryExecutor)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RetryEvent {
    /// An `execute()` or replay began
    OperationStart {
        executor: String,
        operation: String,
        timestamp: DateTime<Utc>,
    },
    /// One attempt failed
    AttemptFailed {
        executor: String,
        operation: String,
        attempt: u32,
        error: FailureSnapshot,
        /// Delay before the next attempt, absent when no retry follows
        #[serde(
            default,
            with = "crate::utils::serde::option_duration_millis",
            skip_serializing_if = "Option::is_none"
        )]
        next_delay: Option<Duration>,
        timestamp: DateTime<Utc>,
    },
    /// The operation itself succeeded
    OperationSuccess {
        executor: String,
        operation: String,
        attempts: u32,
        #[serde(with = "crate::utils::serde::duration_millis")]
        duration: Duration,
        timestamp: DateTime<Utc>,
    },
    /// The retry phase ended in failure; fallbacks run next
    OperationFailed {
        executor: String,
        operation: String,
        attempts: u32,
        error: FailureSnapshot,
        timestamp: DateTime<Utc>,
    },
    /// A fallback produced the result
    FallbackSuccess {
        executor: String,
        fallback: String,
        #[serde(with = "crate::utils::serde::duration_millis")]
        duration: Duration,
        timestamp: DateTime<Utc>,
    },
    /// A fallback failed and was skipped
    FallbackFailed {
        executor: String,
        fallback: String,
        error: FailureSnapshot,
        timestamp: DateTime<Utc>,
    },
    /// The operation was stored as a dead letter
    DeadLetterAdded {
        executor: String,
        id: String,
        operation: String,
        error: FailureSnapshot,
        timestamp: DateTime<Utc>,
    },
    /// A dead letter was replayed
    DeadLetterReplayed {
        executor: String,
        id: String,
        succeeded: bool,
        timestamp: DateTime<Utc>,
    },
}

impl RetryEvent {
    /// Name of the executor that published the event
    pub fn executor(&self) -> &str {
        match self {
            Self::OperationStart { executor, .. }
            | Self::AttemptFailed { executor, .. }
            | Self::OperationSuccess { executor, .. }
            | Self::OperationFailed { executor, .. }
            | Self::FallbackSuccess { executor, .. }
            | Self::FallbackFailed { executor, .. }
            | Self::DeadLetterAdded { executor, .. }
            | Self::DeadLetterReplayed { executor, .. } => executor,
        }
    }

    /// When the event was published
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::OperationStart { timestamp, .. }
            | Self::AttemptFailed { timestamp, .. }
            | Self::OperationSuccess { timestamp, .. }
            | Self::OperationFailed { timestamp, .. }
            | Self::FallbackSuccess { timestamp, .. }
            | Self::FallbackFailed { timestamp, .. }
            | Self::DeadLetterAdded { timestamp, .. }
            | Self::DeadLetterReplayed { timestamp, .. } => *timestamp,
        }
    }

    /// Snake-case event name, matching the serialized `event` tag
    pub const fn name(&self) -> &'static str {
        match self {
            Self::OperationStart { .. } => "operation_start",
            Self::AttemptFailed { .. } => "attempt_failed",
            Self::OperationSuccess { .. } => "operation_success",
            Self::OperationFailed { .. } => "operation_failed",
            Self::FallbackSuccess { .. } => "fallback_success",
            Self::FallbackFailed { .. } => "fallback_failed",
            Self::DeadLetterAdded { .. } => "dead_letter_added",
            Self::DeadLetterReplayed { .. } => "dead_letter_replayed",
        }
    }
}

/// Broadcast fan-out of [`RetryEvent`]s
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<RetryEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Bus with no subscribers yet
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { sender }
    }

    /// New receiver for events published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<RetryEvent> {
        self.sender.subscribe()
    }

    /// Live receivers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Publish an event; a no-op when nobody is subscribed
    pub fn publish(&self, event: RetryEvent) {
        // send only fails when there are no receivers
        let _ = self.sender.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start(executor: &str) -> RetryEvent {
        RetryEvent::OperationStart {
            executor: executor.into(),
            operation: "op".into(),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_noop() {
        let bus = EventBus::new();
        bus.publish(start("a"));
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_subscribers_receive_in_order() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.publish(start("first"));
        bus.publish(start("second"));

        assert_eq!(rx.recv().await.unwrap().executor(), "first");
        assert_eq!(rx.recv().await.unwrap().executor(), "second");
    }

    #[test]
    fn test_event_serializes_with_tag() {
        let event = RetryEvent::AttemptFailed {
            executor: "billing".into(),
            operation: "charge".into(),
            attempt: 2,
            error: FailureSnapshot {
                kind: "Error".into(),
                message: "ECONNRESET".into(),
                code: None,
            },
            next_delay: Some(Duration::from_millis(400)),
            timestamp: Utc::now(),
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "attempt_failed");
        assert_eq!(json["next_delay"], 400);
        assert_eq!(event.name(), "attempt_failed");

        let back: RetryEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }
}

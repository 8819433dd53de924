//! Testing utilities and helpers
//!
//! [`ScriptedOperation`] stands in for a flaky dependency: it fails a fixed
//! number of times with a chosen error and then succeeds, counting every
//! call. Clones share their counters, so a test can hand one clone to an
//! executor and keep another for assertions.
//!
//! ## Usage
//!
//! ```rust
//! use rampart_common::testing::ScriptedOperation;
//! use rampart_common::OperationFailure;
//!
//! let flaky = ScriptedOperation::failing_times(2, OperationFailure::network("ECONNRESET"));
//! let operation = flaky.succeed_with(42_u32);
//! // executor.execute(operation).await ...
//! assert_eq!(flaky.calls(), 0);
//! ```

#![allow(clippy::missing_panics_doc)]

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::resilience::OperationFailure;

/// Scripted stand-in for an unreliable call
#[derive(Debug, Clone)]
pub struct ScriptedOperation {
    calls: Arc<AtomicU32>,
    remaining_failures: Arc<AtomicU32>,
    error: OperationFailure,
}

impl ScriptedOperation {
    /// Fail the first `failures` calls with `error`, then succeed
    pub fn failing_times(failures: u32, error: OperationFailure) -> Self {
        Self {
            calls: Arc::new(AtomicU32::new(0)),
            remaining_failures: Arc::new(AtomicU32::new(failures)),
            error,
        }
    }

    /// Fail every call with `error` until [`heal`](Self::heal) is called
    pub fn always_failing(error: OperationFailure) -> Self {
        Self::failing_times(u32::MAX, error)
    }

    /// Succeed on every call
    pub fn succeeding() -> Self {
        Self::failing_times(0, OperationFailure::new("Unused", "unused"))
    }

    /// Calls made so far across all clones
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Make every following call succeed
    pub fn heal(&self) {
        self.remaining_failures.store(0, Ordering::SeqCst);
    }

    /// Run one scripted call
    pub fn call(&self) -> Result<(), OperationFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let failed = self
            .remaining_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failed {
            Err(self.error.clone())
        } else {
            Ok(())
        }
    }

    /// Operation closure resolving to `value` once the failures are used up
    pub fn succeed_with<T>(
        &self,
        value: T,
    ) -> impl Fn() -> std::pin::Pin<Box<dyn Future<Output = Result<T, OperationFailure>> + Send>>
           + Send
           + Sync
           + 'static
    where
        T: Clone + Send + Sync + 'static,
    {
        let script = self.clone();
        move || {
            let outcome = script.call().map(|()| value.clone());
            Box::pin(async move { outcome })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fails_then_succeeds() {
        let script = ScriptedOperation::failing_times(2, OperationFailure::network("ECONNRESET"));

        assert!(script.call().is_err());
        assert!(script.call().is_err());
        assert!(script.call().is_ok());
        assert_eq!(script.calls(), 3);
    }

    #[test]
    fn test_heal_stops_failures() {
        let script = ScriptedOperation::always_failing(OperationFailure::unauthorized("nope"));
        assert!(script.call().is_err());

        script.heal();
        assert!(script.call().is_ok());
    }

    #[tokio::test]
    async fn test_clones_share_counters() {
        let script = ScriptedOperation::failing_times(1, OperationFailure::network("ETIMEDOUT"));
        let operation = script.succeed_with("done");

        assert!(operation().await.is_err());
        assert_eq!(operation().await.unwrap(), "done");
        assert_eq!(script.calls(), 2);
    }
}

//! Named executor registry
//!
//! An [`ExecutorRegistry`] is an explicit value, cloned into whatever needs
//! it (it is an `Arc` inside). Call sites that share a logical operation
//! name share one executor, and therefore one set of metrics, fallbacks and
//! dead letters.
//!
//! The first `get_or_create` for a name wins. A later call with different
//! [`RetrySettings`] logs a conflict warning and gets the existing executor;
//! [`ExecutorRegistry::try_get_or_create`] rejects it instead. Custom delay
//! functions and retry predicates cannot be compared and are not part of the
//! conflict check.

use std::any::{type_name, Any};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use parking_lot::RwLock;
use tracing::{info, warn};

use super::classify::Failure;
use super::config::{RetryConfig, RetryConfigBuilder, RetrySettings};
use super::error::{ExecutionError, ResilienceError, ResilienceResult};
use super::executor::RetryExecutor;
use super::metrics::{MetricsCollector, RetryMetricsSnapshot};
use crate::error::CommonError;

struct RegistryEntry {
    settings: RetrySettings,
    executor: Arc<dyn Any + Send + Sync>,
    metrics: Arc<MetricsCollector>,
    type_name: &'static str,
}

#[derive(Default)]
struct RegistryInner {
    defaults: RetrySettings,
    presets: HashMap<String, RetrySettings>,
    executors: RwLock<HashMap<String, RegistryEntry>>,
}

/// Shared map of named [`RetryExecutor`]s
#[derive(Clone, Default)]
pub struct ExecutorRegistry {
    inner: Arc<RegistryInner>,
}

impl fmt::Debug for ExecutorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutorRegistry")
            .field("defaults", &self.inner.defaults)
            .field("presets", &self.inner.presets.keys().collect::<Vec<_>>())
            .field("executors", &self.names())
            .finish()
    }
}

enum Conflict {
    Warn,
    Reject,
}

impl ExecutorRegistry {
    /// Empty registry using the default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry whose [`config`](Self::config) builders start from `defaults`,
    /// or from the matching entry of `presets`
    pub fn with_settings(
        defaults: RetrySettings,
        presets: impl IntoIterator<Item = (String, RetrySettings)>,
    ) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                defaults,
                presets: presets.into_iter().collect(),
                executors: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Configuration builder for `name`, seeded with its preset or the
    /// registry defaults
    pub fn config(&self, name: &str) -> RetryConfigBuilder {
        let settings = self.inner.presets.get(name).unwrap_or(&self.inner.defaults).clone();
        RetryConfig::builder(name).settings(settings)
    }

    /// Get the executor named `config.name`, creating it on first use
    pub fn get_or_create<T, E>(
        &self,
        config: RetryConfig,
    ) -> ResilienceResult<Arc<RetryExecutor<T, E>>>
    where
        T: Send + 'static,
        E: Failure + 'static,
    {
        self.resolve(config, Conflict::Warn)
    }

    /// Like [`get_or_create`](Self::get_or_create) but fails with
    /// [`ResilienceError::ConfigConflict`] when the settings differ
    pub fn try_get_or_create<T, E>(
        &self,
        config: RetryConfig,
    ) -> ResilienceResult<Arc<RetryExecutor<T, E>>>
    where
        T: Send + 'static,
        E: Failure + 'static,
    {
        self.resolve(config, Conflict::Reject)
    }

    fn resolve<T, E>(
        &self,
        config: RetryConfig,
        on_conflict: Conflict,
    ) -> ResilienceResult<Arc<RetryExecutor<T, E>>>
    where
        T: Send + 'static,
        E: Failure + 'static,
    {
        let mut executors = self.inner.executors.write();

        if let Some(entry) = executors.get(&config.name) {
            if entry.settings != config.settings {
                match on_conflict {
                    Conflict::Reject => {
                        return Err(ResilienceError::ConfigConflict { name: config.name });
                    }
                    Conflict::Warn => warn!(
                        executor = %config.name,
                        existing = ?entry.settings,
                        requested = ?config.settings,
                        "Executor already registered with different settings, keeping the original"
                    ),
                }
            }
            return downcast(&config.name, entry);
        }

        let name = config.name.clone();
        let settings = config.settings.clone();
        let executor = Arc::new(RetryExecutor::<T, E>::new(config)?);
        executors.insert(
            name.clone(),
            RegistryEntry {
                settings,
                executor: Arc::clone(&executor) as Arc<dyn Any + Send + Sync>,
                metrics: executor.metrics_handle(),
                type_name: type_name::<RetryExecutor<T, E>>(),
            },
        );
        info!(executor = %name, "Registered retry executor");
        Ok(executor)
    }

    /// Look up an existing executor
    pub fn get<T, E>(&self, name: &str) -> ResilienceResult<Arc<RetryExecutor<T, E>>>
    where
        T: Send + 'static,
        E: Failure + 'static,
    {
        let executors = self.inner.executors.read();
        let entry = executors
            .get(name)
            .ok_or_else(|| CommonError::not_found_with_id("Executor", name))?;
        downcast(name, entry)
    }

    /// Whether an executor named `name` exists
    pub fn contains(&self, name: &str) -> bool {
        self.inner.executors.read().contains_key(name)
    }

    /// Drop the executor named `name`; callers holding an `Arc` keep it alive
    pub fn remove(&self, name: &str) -> bool {
        let removed = self.inner.executors.write().remove(name).is_some();
        if removed {
            info!(executor = %name, "Removed retry executor");
        }
        removed
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.executors.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered executors
    pub fn len(&self) -> usize {
        self.inner.executors.read().len()
    }

    /// Whether no executor is registered
    pub fn is_empty(&self) -> bool {
        self.inner.executors.read().is_empty()
    }

    /// Metrics snapshot of every registered executor
    pub fn all_metrics(&self) -> BTreeMap<String, RetryMetricsSnapshot> {
        self.inner
            .executors
            .read()
            .iter()
            .map(|(name, entry)| (name.clone(), entry.metrics.snapshot()))
            .collect()
    }

    /// Reset the metrics of every registered executor
    pub fn reset_all_metrics(&self) {
        for entry in self.inner.executors.read().values() {
            entry.metrics.reset();
        }
    }

    /// Wrap `f` so every call runs through the shared executor for `config`
    ///
    /// The returned function clones its argument for each attempt.
    pub fn protect<A, T, E, F, Fut>(
        &self,
        config: RetryConfig,
        f: F,
    ) -> ResilienceResult<
        impl Fn(A) -> BoxFuture<'static, Result<T, ExecutionError<E>>> + Send + Sync,
    >
    where
        A: Clone + Send + Sync + 'static,
        T: Send + 'static,
        E: Failure + 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let executor = self.get_or_create::<T, E>(config)?;
        let f = Arc::new(f);

        Ok(move |args: A| {
            let executor = Arc::clone(&executor);
            let f = Arc::clone(&f);
            async move { executor.execute(move || f(args.clone())).await.into_result() }.boxed()
        })
    }
}

fn downcast<T, E>(name: &str, entry: &RegistryEntry) -> ResilienceResult<Arc<RetryExecutor<T, E>>>
where
    T: Send + 'static,
    E: Failure + 'static,
{
    Arc::clone(&entry.executor).downcast::<RetryExecutor<T, E>>().map_err(|_| {
        warn!(
            executor = %name,
            registered = entry.type_name,
            requested = type_name::<RetryExecutor<T, E>>(),
            "Executor type mismatch"
        );
        ResilienceError::TypeMismatch { name: name.to_string() }
    })
}

/// Run `operation` once through the registry executor for `config`
///
/// Returns the value (possibly from a fallback) or the original terminal
/// error.
pub async fn with_retry<T, E, F, Fut>(
    registry: &ExecutorRegistry,
    config: RetryConfig,
    operation: F,
) -> Result<T, ExecutionError<E>>
where
    T: Send + 'static,
    E: Failure + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
{
    let executor = registry.get_or_create::<T, E>(config)?;
    executor.execute(operation).await.into_result()
}

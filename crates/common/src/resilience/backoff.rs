//! Backoff delay computation
//!
//! Delays are computed in whole milliseconds. For attempt `n` (1-based, the
//! attempt that just failed):
//!
//! - Exponential: `min(initial × factor^(n−1), max)`
//! - Linear: `min(initial × n, max)`
//! - Fixed: `initial`
//! - Custom: the configured delay function, called with `n`
//!
//! Jitter adds a uniform offset in `[-10%, +10%]` of the computed delay,
//! floored at zero.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::config::RetrySettings;
use super::error::{ResilienceError, ResilienceResult};

/// Fraction of the delay used as the jitter spread
pub const JITTER_RATIO: f64 = 0.1;

/// User-supplied delay function for [`BackoffStrategy::Custom`]
pub type DelayFn = Arc<dyn Fn(u32) -> Duration + Send + Sync>;

/// Backoff strategy for calculating retry delays
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Delay grows geometrically by the backoff factor
    #[default]
    Exponential,
    /// Delay grows by `initial_delay` each attempt
    Linear,
    /// Same delay between every attempt
    Fixed,
    /// Delay produced by a caller-supplied function
    Custom,
}

impl BackoffStrategy {
    /// Lowercase name, as used in configuration files
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Exponential => "exponential",
            Self::Linear => "linear",
            Self::Fixed => "fixed",
            Self::Custom => "custom",
        }
    }
}

impl fmt::Display for BackoffStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackoffStrategy {
    type Err = ResilienceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exponential" => Ok(Self::Exponential),
            "linear" => Ok(Self::Linear),
            "fixed" => Ok(Self::Fixed),
            "custom" => Ok(Self::Custom),
            other => Err(ResilienceError::invalid_config(format!(
                "unknown backoff strategy '{other}' (expected exponential, linear, fixed or custom)"
            ))),
        }
    }
}

/// Compute the un-jittered delay after failed attempt `attempt`
///
/// Fails only for [`BackoffStrategy::Custom`] without a delay function.
pub fn base_delay(
    settings: &RetrySettings,
    delay_fn: Option<&DelayFn>,
    attempt: u32,
) -> ResilienceResult<Duration> {
    let initial = settings.initial_delay.as_millis() as f64;
    let max = settings.max_delay.as_millis() as f64;

    let millis = match settings.strategy {
        BackoffStrategy::Exponential => {
            let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
            (initial * settings.backoff_factor.powi(exponent)).min(max)
        }
        BackoffStrategy::Linear => (initial * f64::from(attempt)).min(max),
        BackoffStrategy::Fixed => initial,
        BackoffStrategy::Custom => {
            let delay_fn = delay_fn.ok_or_else(ResilienceError::missing_delay_fn)?;
            return Ok(truncate_millis(delay_fn(attempt)));
        }
    };

    Ok(from_millis_f64(millis))
}

/// Perturb `delay` by a uniform offset in `[-10%, +10%]`
pub fn apply_jitter(delay: Duration) -> Duration {
    let millis = delay.as_millis() as f64;
    let spread = millis * JITTER_RATIO;
    if spread <= 0.0 {
        return delay;
    }

    let offset = rand::thread_rng().gen_range(-spread..=spread);
    from_millis_f64(millis + offset)
}

fn from_millis_f64(millis: f64) -> Duration {
    if millis.is_nan() || millis <= 0.0 {
        return Duration::ZERO;
    }
    // `as` saturates for values beyond u64::MAX
    Duration::from_millis(millis.trunc() as u64)
}

fn truncate_millis(delay: Duration) -> Duration {
    Duration::from_millis(u64::try_from(delay.as_millis()).unwrap_or(u64::MAX))
}

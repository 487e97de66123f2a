//! Engine configuration.
//!
//! Durations are stored as milliseconds so configs round-trip through JSON
//! and environment variables unchanged.

use std::time::Duration;

use quasar_render::RenderConfig;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Retry policy with configurable backoff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Consecutive failed attempts after which a phase gives up.
    pub max_attempts: u32,
    /// Delay before the first retry, in milliseconds.
    pub initial_delay_ms: u64,
    /// Upper bound on delay, in milliseconds.
    pub max_delay_ms: u64,
    /// Multiplier applied to the delay after each attempt.
    pub backoff_multiplier: f64,
}

impl RetryConfig {
    /// Create a fixed-delay retry policy.
    #[must_use]
    pub fn fixed(max_attempts: u32, delay_ms: u64) -> Self {
        Self {
            max_attempts,
            initial_delay_ms: delay_ms,
            max_delay_ms: delay_ms,
            backoff_multiplier: 1.0,
        }
    }

    /// Create an exponential-backoff retry policy (multiplier = 2.0).
    #[must_use]
    pub fn exponential(max_attempts: u32, initial_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_attempts,
            initial_delay_ms,
            max_delay_ms,
            backoff_multiplier: 2.0,
        }
    }

    /// Delay before retry number `attempt` (0-indexed), capped at the maximum.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(i32::MAX as u32) as i32;
        let delay_ms = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(exponent);
        let capped = delay_ms.min(self.max_delay_ms as f64) as u64;
        Duration::from_millis(capped)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::exponential(10, 500, 60_000)
    }
}

/// Per-pass behavior of the [`ActionReconciler`](crate::ActionReconciler).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconcilerConfig {
    /// How often a running execution is polled, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Fixpoint iterations per pass; `None` renders to completion in one pass.
    #[serde(default)]
    pub render_iterations_per_pass: Option<usize>,
    /// Backoff for retryable failures.
    #[serde(default)]
    pub retry: RetryConfig,
    /// Wall-clock budget of a submitted execution, in milliseconds.
    #[serde(default)]
    pub runner_timeout_ms: Option<u64>,
}

fn default_poll_interval_ms() -> u64 {
    5_000
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            render_iterations_per_pass: None,
            retry: RetryConfig::default(),
            runner_timeout_ms: None,
        }
    }
}

impl ReconcilerConfig {
    /// Poll interval as a [`Duration`].
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Runner timeout as a [`Duration`].
    #[must_use]
    pub fn runner_timeout(&self) -> Option<Duration> {
        self.runner_timeout_ms.map(Duration::from_millis)
    }
}

/// Worker pool settings of the [`Controller`](crate::Controller).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Passes running concurrently.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Bound of the work queue.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_workers() -> usize {
    4
}

fn default_queue_capacity() -> usize {
    1024
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Renderer limits.
    #[serde(default)]
    pub render: RenderConfig,
    /// Reconciler behavior.
    #[serde(default)]
    pub reconciler: ReconcilerConfig,
    /// Worker pool.
    #[serde(default)]
    pub controller: ControllerConfig,
}

impl EngineConfig {
    /// Defaults overridden by `QUASAR_WORKERS`, `QUASAR_MAX_RENDER_DEPTH`
    /// and `QUASAR_POLL_INTERVAL_MS`.
    pub fn from_env() -> Result<Self, EngineError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env), reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, EngineError> {
        let mut config = Self::default();
        if let Some(workers) = parse(&lookup, "QUASAR_WORKERS")? {
            config.controller.workers = workers;
        }
        if let Some(depth) = parse(&lookup, "QUASAR_MAX_RENDER_DEPTH")? {
            config.render.max_depth = depth;
        }
        if let Some(ms) = parse(&lookup, "QUASAR_POLL_INTERVAL_MS")? {
            config.reconciler.poll_interval_ms = ms;
        }
        Ok(config)
    }
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>, EngineError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    lookup(key)
        .map(|value| {
            value.trim().parse().map_err(|e: T::Err| EngineError::Config {
                key: key.to_owned(),
                value: value.clone(),
                reason: e.to_string(),
            })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn retry_config_fixed() {
        let cfg = RetryConfig::fixed(3, 500);
        assert_eq!(cfg.max_attempts, 3);
        assert_eq!(cfg.max_delay_ms, 500);
        assert!((cfg.backoff_multiplier - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn delay_for_attempt_exponential_backoff() {
        let cfg = RetryConfig::exponential(5, 100, 10_000);
        assert_eq!(cfg.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(cfg.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(cfg.delay_for_attempt(3), Duration::from_millis(800));
    }

    #[test]
    fn delay_for_attempt_caps_at_max() {
        let cfg = RetryConfig::exponential(10, 100, 500);
        assert_eq!(cfg.delay_for_attempt(3), Duration::from_millis(500));
        assert_eq!(cfg.delay_for_attempt(u32::MAX), Duration::from_millis(500));
    }

    #[test]
    fn defaults() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.controller.workers, 4);
        assert_eq!(cfg.controller.queue_capacity, 1024);
        assert_eq!(cfg.reconciler.poll_interval(), Duration::from_secs(5));
        assert_eq!(cfg.reconciler.render_iterations_per_pass, None);
        assert_eq!(cfg.reconciler.runner_timeout(), None);
        assert_eq!(cfg.render.max_depth, 16);
    }

    #[test]
    fn environment_overrides() {
        let cfg = EngineConfig::from_lookup(|key| match key {
            "QUASAR_WORKERS" => Some("8".into()),
            "QUASAR_MAX_RENDER_DEPTH" => Some(" 5 ".into()),
            "QUASAR_POLL_INTERVAL_MS" => Some("250".into()),
            _ => None,
        })
        .unwrap();
        assert_eq!(cfg.controller.workers, 8);
        assert_eq!(cfg.render.max_depth, 5);
        assert_eq!(cfg.reconciler.poll_interval(), Duration::from_millis(250));
    }

    #[test]
    fn malformed_override_names_the_variable() {
        let err = EngineConfig::from_lookup(|key| {
            (key == "QUASAR_WORKERS").then(|| "many".to_owned())
        })
        .unwrap_err();
        match err {
            EngineError::Config { key, value, .. } => {
                assert_eq!(key, "QUASAR_WORKERS");
                assert_eq!(value, "many");
            }
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn partial_json() {
        let cfg: EngineConfig = serde_json::from_str(
            r#"{ "reconciler": { "poll_interval_ms": 10, "runner_timeout_ms": 60000 } }"#,
        )
        .unwrap();
        assert_eq!(cfg.reconciler.poll_interval_ms, 10);
        assert_eq!(cfg.reconciler.runner_timeout(), Some(Duration::from_secs(60)));
        assert_eq!(cfg.reconciler.retry, RetryConfig::default());
        assert_eq!(cfg.controller, ControllerConfig::default());
    }
}

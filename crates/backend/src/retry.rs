// Retry policy for outbound queries
//
// - Exponential backoff with up to 25% jitter
// - Retry on network errors, timeouts, 429 and 5xx
// - Retry-After raises the delay, never past the ceiling

use std::time::Duration;

use lens_core::{QueryError, config::RetryConfig};

/// Backoff schedule for transient failures
#[derive(Debug, Clone)]
pub struct RetryPolicy {
  /// Maximum number of retries after the first attempt
  pub max_retries: u32,
  /// Delay before the first retry
  pub initial_backoff: Duration,
  /// Ceiling for any single delay
  pub max_backoff: Duration,
  /// Exponential factor
  pub backoff_multiplier: f64,
  /// Whether to add jitter to backoff
  pub add_jitter: bool,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self::from_config(&RetryConfig::default())
  }
}

impl RetryPolicy {
  pub fn from_config(config: &RetryConfig) -> Self {
    Self {
      max_retries: config.max_retries,
      initial_backoff: Duration::from_millis(config.initial_backoff_ms),
      max_backoff: Duration::from_millis(config.max_backoff_ms),
      backoff_multiplier: config.backoff_multiplier,
      add_jitter: config.jitter,
    }
  }

  /// A policy that never retries
  pub fn none() -> Self {
    Self {
      max_retries: 0,
      ..Self::default()
    }
  }

  /// Calculate backoff duration for a given retry (0-based)
  pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
    let exponent = attempt.min(i32::MAX as u32) as i32;
    let base = self.initial_backoff.as_secs_f64() * self.backoff_multiplier.max(1.0).powi(exponent);
    let mut backoff = Duration::from_secs_f64(base.min(self.max_backoff.as_secs_f64()));

    if self.add_jitter {
      let jitter_factor = 1.0 + (rand_f64() * 0.25);
      backoff = Duration::from_secs_f64(backoff.as_secs_f64() * jitter_factor);
    }

    backoff.min(self.max_backoff)
  }

  /// Delay before retrying after `error`, or `None` when it must not be
  /// retried. `retries` is the number of retries already performed.
  pub fn delay_for(&self, error: &QueryError, retries: u32) -> Option<Duration> {
    if !error.is_transient() || retries >= self.max_retries {
      return None;
    }

    let backoff = self.backoff_for_attempt(retries);
    Some(match error.retry_after() {
      Some(requested) => backoff.max(requested.min(self.max_backoff)),
      None => backoff,
    })
  }
}

/// Pseudo-random value in [0, 1) for jitter
fn rand_f64() -> f64 {
  use std::time::{SystemTime, UNIX_EPOCH};

  let nanos = SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .unwrap_or_default()
    .subsec_nanos();

  (nanos as f64 / u32::MAX as f64).fract()
}

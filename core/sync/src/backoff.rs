//! Capped exponential backoff for the periodic sync tick.

use std::time::Duration;
use tracing::debug;

use crate::engine::SyncOutcome;

/// Configuration for backoff behavior.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Delay with no recent failures (the periodic interval).
    pub initial_delay: Duration,
    /// Maximum delay (cap for exponential growth).
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Whether to add jitter to delays.
    pub jitter: bool,
}

impl BackoffConfig {
    /// Create a configuration starting at `initial_delay`.
    pub fn new(initial_delay: Duration) -> Self {
        Self {
            initial_delay,
            max_delay: Duration::from_secs(30 * 60),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }

    /// Set maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Enable or disable jitter.
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Calculate delay after `failures` consecutive failed passes.
    pub fn delay_for_attempt(&self, failures: u32) -> Duration {
        let base_delay = self.initial_delay.as_millis() as f64
            * self.backoff_multiplier.powi(failures as i32);

        let capped_delay = base_delay.min(self.max_delay.as_millis() as f64);

        let final_delay = if self.jitter && failures > 0 {
            // Add random jitter of +/- 25%
            let jitter_factor = 0.75 + (rand::random::<f64>() * 0.5);
            (capped_delay * jitter_factor).min(self.max_delay.as_millis() as f64)
        } else {
            capped_delay
        };

        Duration::from_millis(final_delay as u64)
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}

/// Tracks consecutive failed passes and the resulting tick delay.
///
/// A pass with at least one failed item counts as failed; a pass where every
/// item went through resets the count. Skipped passes change nothing.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: BackoffConfig,
    failures: u32,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            config,
            failures: 0,
        }
    }

    /// Update after a pass.
    pub fn record(&mut self, outcome: &SyncOutcome) {
        if let SyncOutcome::Completed(report) = outcome {
            if report.failed > 0 {
                self.failures = self.failures.saturating_add(1);
                debug!("Backing off after {} failed pass(es)", self.failures);
            } else {
                self.failures = 0;
            }
        }
    }

    /// Delay until the next periodic tick.
    pub fn next_delay(&self) -> Duration {
        self.config.delay_for_attempt(self.failures)
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.failures
    }
}

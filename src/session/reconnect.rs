use std::time::Duration;

use backoff::{backoff::Backoff, ExponentialBackoff};

use crate::env::ReconnectSettings;

/// Bounded exponential backoff between reconnect attempts, without jitter.
pub struct ReconnectPolicy {
    backoff: ExponentialBackoff,
    attempts: u32,
    max_attempts: u32,
}

impl ReconnectPolicy {
    pub fn new(initial_delay: Duration, max_delay: Duration, max_attempts: u32) -> Self {
        let backoff = ExponentialBackoff {
            current_interval: initial_delay,
            initial_interval: initial_delay,
            randomization_factor: 0.0,
            multiplier: 2.0,
            max_interval: max_delay,
            max_elapsed_time: None,
            ..ExponentialBackoff::default()
        };
        Self {
            backoff,
            attempts: 0,
            max_attempts,
        }
    }

    pub fn from_settings(settings: &ReconnectSettings) -> Self {
        Self::new(
            Duration::from_millis(settings.initial_delay_ms),
            Duration::from_millis(settings.max_delay_ms),
            settings.max_attempts,
        )
    }

    /// Delay before the next attempt, or `None` once the ceiling is reached.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempts >= self.max_attempts {
            return None;
        }
        self.attempts += 1;
        self.backoff.next_backoff()
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Called after a successful connect.
    pub fn reset(&mut self) {
        self.attempts = 0;
        self.backoff.reset();
    }
}

impl std::fmt::Debug for ReconnectPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconnectPolicy")
            .field("attempts", &self.attempts)
            .field("max_attempts", &self.max_attempts)
            .field("next_interval", &self.backoff.current_interval)
            .finish()
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::from_settings(&ReconnectSettings::default())
    }
}

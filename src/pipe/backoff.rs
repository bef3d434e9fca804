//! Exponential reconnect backoff

use std::time::Duration;

use crate::config::BackoffConfig;

/// Doubling delay, capped, reset after a successful connect
#[derive(Debug, Clone)]
pub struct Backoff {
    config: BackoffConfig,
    current: Duration,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            config,
            current: config.initial_delay,
        }
    }

    /// Delay the next wait would use
    pub fn current(&self) -> Duration {
        self.current
    }

    /// Return to the initial delay
    pub fn reset(&mut self) {
        self.current = self.config.initial_delay;
    }

    /// Take the current delay and double it for next time
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.config.max_delay);
        delay
    }
}

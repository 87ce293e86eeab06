//! Doubling reconnect delay.

use std::time::Duration;

/// Smallest delay the client ever waits between attempts.
pub const MIN_DELAY: Duration = Duration::from_millis(10);

/// Reconnect delay that doubles per failure up to a ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    /// Start at `base`, never exceeding `max`.
    ///
    /// A base below [`MIN_DELAY`] is raised to it so retries never spin.
    #[must_use]
    pub fn new(base: Duration, max: Duration) -> Self {
        let base = base.max(MIN_DELAY);
        let max = max.max(base);
        Self {
            base,
            max,
            current: base,
        }
    }

    /// Delay the next wait will use.
    #[must_use]
    pub const fn current(&self) -> Duration {
        self.current
    }

    /// Return the delay to wait now and double the following one.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }

    /// Go back to the base delay after a successful open.
    pub const fn reset(&mut self) {
        self.current = self.base;
    }
}

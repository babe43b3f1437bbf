// Reconnect backoff policy, independent of any timer
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    attempt: u32,
    max_attempts: u32,
    base: Duration,
    factor: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(Duration::from_millis(3000), 1.5, 10)
    }
}

impl ReconnectPolicy {
    pub fn new(base: Duration, factor: f64, max_attempts: u32) -> Self {
        Self {
            attempt: 0,
            max_attempts,
            base,
            factor,
        }
    }

    /// Delay before retry number `attempt` (0-based): `base * factor^attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = i32::try_from(attempt).unwrap_or(i32::MAX);
        self.base.mul_f64(self.factor.powi(exp))
    }

    /// Delay for the next retry, or `None` once the cap is reached.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.is_exhausted() {
            return None;
        }
        let delay = self.delay_for(self.attempt);
        self.attempt += 1;
        Some(delay)
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempt >= self.max_attempts
    }
}

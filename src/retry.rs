use crate::config::EngineSettings;
use std::time::Duration;

/// Bounded exponential backoff for re-scans while the oracle's data fills in.
#[derive(Debug)]
pub struct RetryScheduler {
    attempts: u32,
    limit: u32,
    base: Duration,
    factor: f64,
    cap: Duration,
}

impl RetryScheduler {
    pub fn new(settings: &EngineSettings) -> Self {
        Self {
            attempts: 0,
            limit: settings.retry_limit,
            base: settings.retry_base,
            factor: settings.retry_factor,
            cap: settings.retry_cap,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Consumes one attempt and returns its delay, or `None` once the limit
    /// is reached.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempts >= self.limit {
            return None;
        }
        self.attempts += 1;
        Some(self.delay_for(self.attempts))
    }

    /// `min(cap, base * factor^attempt)`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let millis = self.base.as_millis() as f64 * self.factor.powi(attempt as i32);
        Duration::from_millis(millis.round() as u64).min(self.cap)
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}

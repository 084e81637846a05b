use std::time::Duration;

/// Consecutive-failure counter owned by the supervisor loop
///
/// Reset after any successful pass; incremented by one per failed pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RetryState {
    count: u32,
}

impl RetryState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current number of consecutive failures
    pub fn count(&self) -> u32 {
        self.count
    }

    /// A pass succeeded
    pub fn reset(&mut self) {
        self.count = 0;
    }

    /// A pass failed; returns the new count
    pub fn record_failure(&mut self) -> u32 {
        self.count = self.count.saturating_add(1);
        self.count
    }

    /// Whether the loop must stop
    pub fn is_exhausted(&self, max_retries: u32) -> bool {
        self.count >= max_retries
    }

    /// Delay before the next attempt: `count × delay`
    ///
    /// Linear, not exponential.
    pub fn backoff(&self, delay: Duration) -> Duration {
        delay.saturating_mul(self.count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_increments_by_one_and_resets() {
        let mut retry = RetryState::new();
        assert_eq!(retry.count(), 0);
        assert_eq!(retry.record_failure(), 1);
        assert_eq!(retry.record_failure(), 2);
        retry.reset();
        assert_eq!(retry.count(), 0);
        assert_eq!(retry.record_failure(), 1);
    }

    #[test]
    fn test_exhaustion_at_max() {
        let mut retry = RetryState::new();
        retry.record_failure();
        retry.record_failure();
        assert!(!retry.is_exhausted(3));
        retry.record_failure();
        assert!(retry.is_exhausted(3));
    }

    #[test]
    fn test_linear_backoff() {
        let delay = Duration::from_secs(1);
        let mut retry = RetryState::new();

        retry.record_failure();
        assert_eq!(retry.backoff(delay), Duration::from_secs(1));
        retry.record_failure();
        assert_eq!(retry.backoff(delay), Duration::from_secs(2));
        retry.record_failure();
        assert_eq!(retry.backoff(delay), Duration::from_secs(3));
    }
}

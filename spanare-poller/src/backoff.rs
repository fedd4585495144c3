//! Retry pacing for a failing endpoint.

use std::time::Duration;

use spanare_core::cancel::SLEEP_SLICE;

/// Thresholds that shape a worker's reaction to consecutive failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Backoff value after a success, and the base the first doubling starts from.
    pub floor: Duration,
    /// Consecutive failures tolerated before backing off.
    pub backoff_after: u32,
    /// Consecutive failures after which a stale worker evicts itself.
    pub evict_after: u32,
    /// How long without a success before eviction is allowed.
    pub stale_window: Duration,
    /// Sleep granularity; bounds shutdown latency.
    pub slice: Duration,
    /// Backoff ceiling as a multiple of the poll interval.
    pub cap_factor: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            floor: Duration::from_millis(100),
            backoff_after: 3,
            evict_after: 10,
            stale_window: Duration::from_secs(300),
            slice: SLEEP_SLICE,
            cap_factor: 10,
        }
    }
}

impl BackoffPolicy {
    pub fn for_interval(&self, poll_interval: Duration) -> Backoff {
        Backoff::new(self.floor, poll_interval.saturating_mul(self.cap_factor))
    }
}

/// Doubling delay between `floor` and `cap`.
#[derive(Clone, Copy, Debug)]
pub struct Backoff {
    current: Duration,
    floor: Duration,
    cap: Duration,
}

impl Backoff {
    pub fn new(floor: Duration, cap: Duration) -> Self {
        let floor = floor.min(cap);
        Self {
            current: floor,
            floor,
            cap,
        }
    }

    /// Doubles the delay, saturating at the cap, and returns it.
    pub fn advance(&mut self) -> Duration {
        self.current = self.current.saturating_mul(2).min(self.cap);
        self.current
    }

    pub fn reset(&mut self) {
        self.current = self.floor;
    }

    #[inline]
    pub fn current(&self) -> Duration {
        self.current
    }

    #[inline]
    pub fn cap(&self) -> Duration {
        self.cap
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn doubles_from_floor() {
        let mut backoff = BackoffPolicy::default().for_interval(Duration::from_secs(1));
        assert_eq!(backoff.current(), Duration::from_millis(100));
        assert_eq!(backoff.advance(), Duration::from_millis(200));
        assert_eq!(backoff.advance(), Duration::from_millis(400));
        assert_eq!(backoff.advance(), Duration::from_millis(800));
        assert_eq!(backoff.advance(), Duration::from_millis(1600));
    }

    #[test]
    fn saturates_at_ten_poll_intervals() {
        let mut backoff = BackoffPolicy::default().for_interval(Duration::from_millis(100));
        for _ in 0..20 {
            backoff.advance();
        }
        assert_eq!(backoff.current(), Duration::from_secs(1));
        assert_eq!(backoff.cap(), Duration::from_secs(1));
    }

    #[test]
    fn reset_returns_to_floor() {
        let mut backoff = BackoffPolicy::default().for_interval(Duration::from_secs(1));
        backoff.advance();
        backoff.advance();
        backoff.reset();
        assert_eq!(backoff.current(), Duration::from_millis(100));
    }

    proptest! {
        #[test]
        fn never_exceeds_cap(interval_ms in 100u64..60_000, steps in 0usize..64) {
            let interval = Duration::from_millis(interval_ms);
            let mut backoff = BackoffPolicy::default().for_interval(interval);
            for _ in 0..steps {
                prop_assert!(backoff.advance() <= interval * 10);
            }
        }
    }
}

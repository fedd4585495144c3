//! ## spanare-core::cancel
//! **Cooperative shutdown flag**
//!
//! Threads never get killed; they check a shared token at every loop head
//! and between sleep slices, so a stop request is honoured within one slice.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Granularity of interruptible sleeps.
pub const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// Shared stop flag, cheap to clone and safe to read from any thread.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests a stop. Returns `true` for the call that flipped the flag.
    pub fn cancel(&self) -> bool {
        !self.cancelled.swap(true, Ordering::AcqRel)
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Sleeps for `total` in `slice`-sized steps, returning early once
    /// cancelled. Returns `true` if the full duration elapsed.
    pub fn sleep(&self, total: Duration, slice: Duration) -> bool {
        let deadline = Instant::now() + total;
        let slice = slice.max(Duration::from_millis(1));

        loop {
            if self.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep(slice.min(deadline - now));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_is_reported_once() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        assert!(token.cancel());
        assert!(!token.cancel());
        assert!(clone.is_cancelled());
    }

    #[test]
    fn sleep_runs_to_completion() {
        let token = CancelToken::new();
        let start = Instant::now();
        assert!(token.sleep(Duration::from_millis(30), Duration::from_millis(10)));
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn sleep_is_interrupted_within_a_slice() {
        let token = CancelToken::new();
        let remote = token.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            remote.cancel();
        });

        let start = Instant::now();
        assert!(!token.sleep(Duration::from_secs(10), SLEEP_SLICE));
        assert!(start.elapsed() < Duration::from_secs(1));
        handle.join().unwrap();
    }
}

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeDelta, Utc};

use crate::clock::Clock;

/// Admits at most `max_requests` calls in any trailing `window`.
///
/// Rejections are not recorded and never wait; the caller decides what to do
/// with a rejected call.
pub struct SlidingWindowRateLimiter {
    max_requests: usize,
    window: TimeDelta,
    clock: Arc<dyn Clock>,
    hits: Mutex<VecDeque<DateTime<Utc>>>,
}

impl SlidingWindowRateLimiter {
    pub fn new(max_requests: u32, window: TimeDelta, clock: Arc<dyn Clock>) -> Self {
        let max_requests = max_requests as usize;
        Self {
            max_requests,
            window,
            clock,
            hits: Mutex::new(VecDeque::with_capacity(max_requests)),
        }
    }

    pub fn max_requests(&self) -> usize {
        self.max_requests
    }

    /// Prune, check and record in one critical section.
    pub fn try_admit(&self) -> bool {
        let now = self.clock.now();
        let mut hits = self.hits.lock().unwrap_or_else(|e| e.into_inner());
        prune(&mut hits, now, self.window);
        if hits.len() >= self.max_requests {
            return false;
        }
        hits.push_back(now);
        true
    }

    /// Calls recorded in the current window.
    pub fn in_window(&self) -> usize {
        let now = self.clock.now();
        let mut hits = self.hits.lock().unwrap_or_else(|e| e.into_inner());
        prune(&mut hits, now, self.window);
        hits.len()
    }
}

// Timestamps are appended in clock order, so stale ones sit at the front.
fn prune(hits: &mut VecDeque<DateTime<Utc>>, now: DateTime<Utc>, window: TimeDelta) {
    while hits.front().is_some_and(|seen| now - *seen >= window) {
        hits.pop_front();
    }
}

impl fmt::Debug for SlidingWindowRateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlidingWindowRateLimiter")
            .field("max_requests", &self.max_requests)
            .field("window", &self.window)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn limiter(max: u32, window_secs: i64) -> (Arc<ManualClock>, SlidingWindowRateLimiter) {
        let clock = Arc::new(ManualClock::at_unix_secs(10_000));
        let limiter =
            SlidingWindowRateLimiter::new(max, TimeDelta::seconds(window_secs), clock.clone());
        (clock, limiter)
    }

    #[test]
    fn rejects_the_call_after_max_requests() {
        let (_clock, limiter) = limiter(3, 60);
        assert!(limiter.try_admit());
        assert!(limiter.try_admit());
        assert!(limiter.try_admit());
        assert!(!limiter.try_admit());
        assert_eq!(limiter.in_window(), 3);
    }

    #[test]
    fn rejected_calls_are_not_recorded() {
        let (clock, limiter) = limiter(1, 60);
        assert!(limiter.try_admit());
        for _ in 0..5 {
            clock.advance(TimeDelta::seconds(10));
            assert!(!limiter.try_admit());
        }
        // Only the admitted call at t=0 counts, so t=60 frees the window.
        clock.advance(TimeDelta::seconds(10));
        assert!(limiter.try_admit());
    }

    #[test]
    fn capacity_returns_once_window_passes_earliest_call() {
        let (clock, limiter) = limiter(2, 60);
        assert!(limiter.try_admit());
        clock.advance(TimeDelta::seconds(30));
        assert!(limiter.try_admit());
        assert!(!limiter.try_admit());

        clock.advance(TimeDelta::seconds(29));
        assert!(!limiter.try_admit());

        // 60s after the first call: only that call drops out.
        clock.advance(TimeDelta::seconds(1));
        assert!(limiter.try_admit());
        assert!(!limiter.try_admit());
        assert_eq!(limiter.in_window(), 2);
    }

    #[test]
    fn in_window_prunes_without_recording() {
        let (clock, limiter) = limiter(5, 60);
        limiter.try_admit();
        limiter.try_admit();
        assert_eq!(limiter.in_window(), 2);
        assert_eq!(limiter.in_window(), 2);

        clock.advance(TimeDelta::seconds(61));
        assert_eq!(limiter.in_window(), 0);
    }

    #[test]
    fn concurrent_callers_never_over_admit() {
        let (_clock, limiter) = limiter(50, 60);
        let limiter = Arc::new(limiter);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                std::thread::spawn(move || (0..20).filter(|_| limiter.try_admit()).count())
            })
            .collect();
        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(admitted, 50);
    }
}

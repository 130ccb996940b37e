//! Rolling-window decision rate limiter.
//!
//! Caps how many decisions a bot may submit in any rolling 60-minute
//! window. When the cap is hit the orchestrator sleeps out the
//! remainder instead of dropping cycles silently.

use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// Rolling 60-minute window.
const WINDOW: Duration = Duration::from_secs(3600);

pub struct DecisionRateLimiter {
    cap: u32,
    submissions: VecDeque<Instant>,
}

impl DecisionRateLimiter {
    pub fn new(cap: u32) -> Self {
        Self {
            cap,
            submissions: VecDeque::new(),
        }
    }

    /// Adjust the cap between cycles (risk-limit updates).
    pub fn set_cap(&mut self, cap: u32) {
        self.cap = cap;
    }

    /// How long to wait before the next submission is allowed.
    /// `None` means a submission may go out now.
    pub fn check(&mut self, now: Instant) -> Option<Duration> {
        self.evict(now);
        if (self.submissions.len() as u32) < self.cap {
            return None;
        }
        // Full window: wait until the oldest submission ages out.
        let oldest = *self.submissions.front()?;
        Some((oldest + WINDOW).saturating_duration_since(now))
    }

    /// Record a submission that was just made.
    pub fn record(&mut self, now: Instant) {
        self.evict(now);
        self.submissions.push_back(now);
    }

    /// Submissions currently inside the rolling window.
    pub fn in_window(&self) -> usize {
        self.submissions.len()
    }

    fn evict(&mut self, now: Instant) {
        while let Some(front) = self.submissions.front() {
            if now.saturating_duration_since(*front) >= WINDOW {
                self.submissions.pop_front();
            } else {
                break;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allows_up_to_cap() {
        let mut limiter = DecisionRateLimiter::new(3);
        let t0 = Instant::now();
        for _ in 0..3 {
            assert!(limiter.check(t0).is_none());
            limiter.record(t0);
        }
        assert!(limiter.check(t0).is_some());
    }

    #[test]
    fn test_wait_time_until_oldest_expires() {
        let mut limiter = DecisionRateLimiter::new(2);
        let t0 = Instant::now();
        limiter.record(t0);
        limiter.record(t0 + Duration::from_secs(600));

        // At t0 + 1000s both submissions are still inside the window;
        // the oldest ages out at t0 + 3600s.
        let wait = limiter.check(t0 + Duration::from_secs(1000)).unwrap();
        assert_eq!(wait, Duration::from_secs(2600));
    }

    #[test]
    fn test_old_submissions_age_out() {
        let mut limiter = DecisionRateLimiter::new(1);
        let t0 = Instant::now();
        limiter.record(t0);
        assert!(limiter.check(t0).is_some());

        let later = t0 + WINDOW + Duration::from_secs(1);
        assert!(limiter.check(later).is_none());
        assert_eq!(limiter.in_window(), 0);
    }

    #[test]
    fn test_set_cap_takes_effect() {
        let mut limiter = DecisionRateLimiter::new(1);
        let t0 = Instant::now();
        limiter.record(t0);
        assert!(limiter.check(t0).is_some());

        limiter.set_cap(5);
        assert!(limiter.check(t0).is_none());
    }

    #[test]
    fn test_rolling_not_fixed_window() {
        let mut limiter = DecisionRateLimiter::new(2);
        let t0 = Instant::now();
        limiter.record(t0);
        limiter.record(t0 + Duration::from_secs(1800));

        // After the first ages out, one slot frees even though the
        // second is still in the window.
        let t = t0 + WINDOW + Duration::from_secs(1);
        assert!(limiter.check(t).is_none());
        assert_eq!(limiter.in_window(), 1);
    }
}

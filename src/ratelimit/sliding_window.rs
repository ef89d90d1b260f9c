//! Sliding window log limiter.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::trace;

use super::admission::Admission;
use crate::error::{Result, TurnstileError};

/// Upper bound on the log slots reserved up front.
const MAX_PREALLOCATED_ENTRIES: usize = 1024;

/// A sliding window log rate limiter.
///
/// Keeps the exact timestamp of every admission made during the trailing
/// `window` and admits a new request only while fewer than `max_requests`
/// of them remain. An entry whose age equals the window length has expired.
///
/// Memory grows with the number of admissions inside one window, bounded
/// by `max_requests`.
#[derive(Debug)]
pub struct SlidingWindowLog {
    /// Maximum admissions within any trailing window
    max_requests: usize,
    /// Length of the trailing window
    window: Duration,
    /// Admission timestamps, oldest first
    log: Mutex<VecDeque<Instant>>,
}

impl SlidingWindowLog {
    /// Create an empty log admitting `max_requests` per `window`.
    ///
    /// A `max_requests` of zero yields a limiter that rejects everything.
    pub fn new(max_requests: usize, window: Duration) -> Result<Self> {
        if window.is_zero() {
            return Err(TurnstileError::InvalidLimiter(
                "window duration must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            max_requests,
            window,
            log: Mutex::new(VecDeque::with_capacity(
                max_requests.min(MAX_PREALLOCATED_ENTRIES),
            )),
        })
    }

    /// Create an empty log with the window given in milliseconds.
    pub fn with_window_ms(max_requests: usize, window_ms: u64) -> Result<Self> {
        Self::new(max_requests, Duration::from_millis(window_ms))
    }

    /// Try to admit a request now.
    pub fn allow(&self) -> bool {
        self.allow_at(Instant::now())
    }

    /// Try to admit a request observed at `now`.
    ///
    /// Expired entries are purged before counting. A rejected request leaves
    /// no trace in the log.
    pub fn allow_at(&self, now: Instant) -> bool {
        let mut log = self.log.lock();

        // Entries must stay in non-decreasing order for the prefix purge.
        let now = log.back().map_or(now, |&newest| now.max(newest));
        purge(&mut log, self.window, now);

        if log.len() < self.max_requests {
            log.push_back(now);
            trace!(in_window = log.len(), limit = self.max_requests, "Sliding window admitted request");
            true
        } else {
            trace!(in_window = log.len(), limit = self.max_requests, "Sliding window rejected request");
            false
        }
    }

    /// Get the maximum admissions per window.
    pub fn max_requests(&self) -> usize {
        self.max_requests
    }

    /// Get the window length.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Get the number of admissions still inside the window.
    pub fn len(&self) -> usize {
        self.len_at(Instant::now())
    }

    /// Get the number of admissions inside the window ending at `now`.
    pub fn len_at(&self, now: Instant) -> usize {
        let mut log = self.log.lock();
        purge(&mut log, self.window, now);
        log.len()
    }

    /// Check whether no admissions remain inside the window.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get the remaining admissions in the current window.
    pub fn remaining(&self) -> usize {
        self.remaining_at(Instant::now())
    }

    /// Get the remaining admissions in the window ending at `now`.
    pub fn remaining_at(&self, now: Instant) -> usize {
        self.max_requests.saturating_sub(self.len_at(now))
    }

    /// Get how long until the next request could be admitted.
    ///
    /// Returns `None` for a limiter that never admits anything.
    pub fn time_until_available(&self) -> Option<Duration> {
        self.time_until_available_at(Instant::now())
    }

    /// Get how long after `now` the next request could be admitted.
    pub fn time_until_available_at(&self, now: Instant) -> Option<Duration> {
        if self.max_requests == 0 {
            return None;
        }

        let mut log = self.log.lock();
        purge(&mut log, self.window, now);

        if log.len() < self.max_requests {
            return Some(Duration::ZERO);
        }

        log.front()
            .map(|&oldest| self.window.saturating_sub(now.saturating_duration_since(oldest)))
    }
}

impl Admission for SlidingWindowLog {
    fn admit(&self) -> bool {
        self.allow()
    }

    fn algorithm(&self) -> &'static str {
        "sliding_window_log"
    }
}

/// Drop every entry at least `window` old from the front of the log.
fn purge(log: &mut VecDeque<Instant>, window: Duration, now: Instant) {
    while let Some(&oldest) = log.front() {
        if now.saturating_duration_since(oldest) < window {
            break;
        }
        log.pop_front();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    #[test]
    fn test_rejects_zero_window() {
        assert!(SlidingWindowLog::new(5, Duration::ZERO).is_err());
        assert!(SlidingWindowLog::with_window_ms(5, 0).is_err());
        assert!(SlidingWindowLog::with_window_ms(0, 1000).is_ok());
    }

    #[test]
    fn test_window_exact_count() {
        let start = Instant::now();
        let window = SlidingWindowLog::with_window_ms(5, 1000).unwrap();

        for i in 1..=5 {
            assert!(window.allow_at(start), "Request {} should be admitted", i);
        }

        // The 6th request should be rejected
        assert!(!window.allow_at(start));
        assert_eq!(window.len_at(start), 5);
    }

    #[test]
    fn test_window_expiry() {
        let start = Instant::now();
        let window = SlidingWindowLog::with_window_ms(5, 1000).unwrap();

        assert!(window.allow_at(start));
        for i in 1..=4 {
            assert!(window.allow_at(start + ms(i * 100)));
        }
        assert!(!window.allow_at(start + ms(900)));

        // The first entry has aged out, the other four still count
        assert!(window.allow_at(start + ms(1050)));
        assert!(!window.allow_at(start + ms(1060)));
        assert_eq!(window.len_at(start + ms(1060)), 5);
    }

    #[test]
    fn test_boundary_age_counts_as_expired() {
        let start = Instant::now();
        let window = SlidingWindowLog::with_window_ms(1, 1000).unwrap();
        assert!(window.allow_at(start));

        assert!(!window.allow_at(start + ms(999)));
        assert!(window.allow_at(start + ms(1000)));
    }

    #[test]
    fn test_zero_limit_rejects_everything() {
        let start = Instant::now();
        let window = SlidingWindowLog::with_window_ms(0, 1000).unwrap();

        for i in 0..10 {
            assert!(!window.allow_at(start + ms(i * 500)));
        }
        assert!(window.is_empty());
        assert_eq!(window.time_until_available_at(start), None);
    }

    #[test]
    fn test_rejection_does_not_append() {
        let start = Instant::now();
        let window = SlidingWindowLog::with_window_ms(3, 1000).unwrap();
        for _ in 0..3 {
            window.allow_at(start);
        }

        for _ in 0..10 {
            assert!(!window.allow_at(start + ms(10)));
        }
        assert_eq!(window.len_at(start + ms(10)), 3);

        // Rejections did not extend the window
        assert!(window.allow_at(start + ms(1000)));
    }

    #[test]
    fn test_remaining_and_time_until_available() {
        let start = Instant::now();
        let window = SlidingWindowLog::with_window_ms(2, 1000).unwrap();

        assert_eq!(window.remaining_at(start), 2);
        assert_eq!(window.time_until_available_at(start), Some(Duration::ZERO));

        window.allow_at(start);
        window.allow_at(start + ms(400));
        assert_eq!(window.remaining_at(start + ms(400)), 0);
        assert_eq!(window.time_until_available_at(start + ms(400)), Some(ms(600)));

        assert_eq!(window.remaining_at(start + ms(1000)), 1);
    }

    #[test]
    fn test_earlier_instant_keeps_log_ordered() {
        let start = Instant::now();
        let window = SlidingWindowLog::with_window_ms(2, 1000).unwrap();

        assert!(window.allow_at(start + ms(500)));
        // Recorded as start + 500ms rather than before the newest entry
        assert!(window.allow_at(start));

        assert_eq!(window.len_at(start + ms(1499)), 2);
        assert_eq!(window.len_at(start + ms(1500)), 0);
    }

    #[test]
    fn test_accessors() {
        let window = SlidingWindowLog::new(7, Duration::from_secs(3)).unwrap();

        assert_eq!(window.max_requests(), 7);
        assert_eq!(window.window(), Duration::from_secs(3));
        assert_eq!(window.algorithm(), "sliding_window_log");
        assert!(window.is_empty());
    }

    #[test]
    fn test_concurrent_admissions_never_exceed_limit() {
        let window = Arc::new(SlidingWindowLog::new(64, Duration::from_secs(60)).unwrap());
        let admitted = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let window = Arc::clone(&window);
                let admitted = Arc::clone(&admitted);
                std::thread::spawn(move || {
                    for _ in 0..40 {
                        if window.admit() {
                            admitted.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(admitted.load(Ordering::SeqCst), 64);
        assert_eq!(window.len(), 64);
    }

    #[test]
    fn test_window_slides_with_wall_clock() {
        let window = SlidingWindowLog::with_window_ms(2, 50).unwrap();

        assert!(window.allow());
        assert!(window.allow());
        assert!(!window.allow());

        std::thread::sleep(ms(70));
        assert!(window.allow());
    }
}

use std::{
    collections::HashMap,
    thread,
    time::{Duration, Instant},
};

use parking_lot::Mutex;

/// A blocking rate limiter handing out permits at a fixed rate.
///
/// [`Self::acquire`] blocks the calling thread until the next permit is due.
/// Permits do not accumulate: a caller arriving after a long pause gets one
/// immediate permit, not a burst.
#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    next_free: Mutex<Instant>,
}

impl RateLimiter {
    /// Create a limiter handing out `permits_per_second` permits.
    ///
    /// `permits_per_second` must be positive; an infinite rate disables
    /// limiting.
    pub fn new(permits_per_second: f64) -> Self {
        Self {
            interval: Duration::from_secs_f64(1.0 / permits_per_second),
            next_free: Mutex::new(Instant::now()),
        }
    }

    /// Block until a permit is available, then take it.
    pub fn acquire(&self) {
        let wait = {
            let mut next_free = self.next_free.lock();
            let now = Instant::now();
            let at = (*next_free).max(now);
            *next_free = at + self.interval;
            at.saturating_duration_since(now)
        };
        if !wait.is_zero() {
            thread::sleep(wait);
        }
    }
}

/// Tracks, per key, when a log line was last emitted, so that callers can
/// warn at most once per `interval` per key.
#[derive(Debug)]
pub struct RateLimitedLogger {
    interval: Duration,
    last_emit: Mutex<HashMap<String, Instant>>,
}

impl RateLimitedLogger {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_emit: Mutex::new(HashMap::new()),
        }
    }

    /// `true` at most once per `interval` for each distinct `key`.
    pub fn should_emit(&self, key: &str) -> bool {
        let mut last_emit = self.last_emit.lock();
        let now = Instant::now();
        match last_emit.get(key) {
            Some(last) if now.duration_since(*last) < self.interval => false,
            _ => {
                last_emit.insert(key.to_owned(), now);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_paces_callers() {
        let limiter = RateLimiter::new(1000.0);
        let start = Instant::now();
        for _ in 0..3 {
            limiter.acquire();
        }
        // First permit is free, the remaining two are spaced 1ms apart.
        assert!(start.elapsed() >= Duration::from_millis(2));
    }

    #[test]
    fn emits_once_per_interval_per_key() {
        let log = RateLimitedLogger::new(Duration::from_secs(10));
        assert!(log.should_emit("ks1"));
        assert!(!log.should_emit("ks1"));
        assert!(log.should_emit("ks2"));
        assert!(!log.should_emit("ks1"));
        assert!(!log.should_emit("ks2"));
    }

    #[test]
    fn emits_again_after_interval() {
        let log = RateLimitedLogger::new(Duration::ZERO);
        assert!(log.should_emit("ks"));
        assert!(log.should_emit("ks"));
    }
}

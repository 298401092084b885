use actix_web::rt::task::JoinHandle;
use actix_web::rt::time::Instant;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_MAX_REQUESTS: u64 = 5;
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(15 * 60);
pub const DEFAULT_SWEEP_INTERVAL_SECONDS: u64 = 60 * 5;

/// Outcome of an admission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitStatus {
    /// Whether the request may proceed.
    pub allowed: bool,
    /// Total number of requests that are permitted within one window.
    pub limit: u64,
    /// Number of requests that will be permitted until the window resets.
    pub remaining: u64,
    /// Time at which the current window expires.
    pub reset: Instant,
}

impl RateLimitStatus {
    /// Seconds until the window resets (rounded upwards, so that it is guaranteed to be reset
    /// after waiting for the duration).
    pub fn seconds_until_reset(&self) -> u64 {
        let millis = self
            .reset
            .saturating_duration_since(Instant::now())
            .as_millis() as f64;
        (millis / 1000f64).ceil() as u64
    }
}

struct Entry {
    window_end: Instant,
    count: u64,
}

/// A fixed window rate limiter that tracks per-identifier request counts in a
/// [Dashmap](dashmap::DashMap) in memory.
///
/// All requests for an identifier within `[window_start, window_start + window)` share one
/// counter that resets abruptly at the boundary, so up to `2 * max_requests` requests can be
/// admitted across a boundary in the worst case. A request that arrives with the quota already
/// filled is rejected without being counted.
///
/// Cloning is cheap; clones share the same entry map and sweep task.
#[derive(Clone)]
pub struct RateLimiter {
    entries: Arc<DashMap<String, Entry>>,
    max_requests: u64,
    window: Duration,
    sweep_handle: Option<Arc<JoinHandle<()>>>,
}

impl RateLimiter {
    pub fn builder() -> RateLimiterBuilder {
        RateLimiterBuilder {
            max_requests: DEFAULT_MAX_REQUESTS,
            window: DEFAULT_WINDOW,
            sweep_interval: Some(Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECONDS)),
        }
    }

    /// Decide admission for one request from `identifier`.
    ///
    /// The first request for an identifier, or the first after its window has expired, starts a
    /// fresh window and is itself counted against it. Expired entries never influence the
    /// decision, whether or not the sweep has removed them yet.
    pub fn check(&self, identifier: &str) -> RateLimitStatus {
        let now = Instant::now();
        let fresh_end = now
            .checked_add(self.window)
            .expect("Window unexpectedly large");
        // Prepared for the no-entry and expired-entry cases; the and_modify closure overwrites
        // it when a live window is found.
        let mut status = RateLimitStatus {
            allowed: true,
            limit: self.max_requests,
            remaining: self.max_requests.saturating_sub(1),
            reset: fresh_end,
        };
        self.entries
            .entry(identifier.to_owned())
            .and_modify(|entry| {
                if entry.window_end > now {
                    if entry.count >= self.max_requests {
                        // Quota filled; the rejected request does not consume further quota.
                        status.allowed = false;
                        status.remaining = 0;
                        status.reset = entry.window_end;
                    } else {
                        entry.count += 1;
                        status.remaining = self.max_requests.saturating_sub(entry.count);
                        status.reset = entry.window_end;
                    }
                } else {
                    // The window has expired; start a fresh one with a count of 1.
                    entry.window_end = fresh_end;
                    entry.count = 1;
                }
            })
            .or_insert_with(|| Entry {
                window_end: fresh_end,
                count: 1,
            });
        status
    }

    /// Forget any tracking state for `identifier`, live or expired. A no-op when none exists.
    pub fn reset(&self, identifier: &str) {
        self.entries.remove(identifier);
    }

    fn sweeper(entries: Arc<DashMap<String, Entry>>, interval: Duration) -> JoinHandle<()> {
        actix_web::rt::spawn(async move {
            loop {
                let now = Instant::now();
                let before = entries.len();
                entries.retain(|_k, entry| entry.window_end > now);
                let removed = before - entries.len();
                if removed > 0 {
                    log::debug!("swept {removed} expired rate limit entries");
                }
                actix_web::rt::time::sleep_until(now + interval).await;
            }
        })
    }
}

impl Drop for RateLimiter {
    fn drop(&mut self) {
        // Abort the sweep task only once the last clone is gone.
        if let Some(handle) = self.sweep_handle.take() {
            if let Ok(handle) = Arc::try_unwrap(handle) {
                handle.abort();
            }
        }
    }
}

pub struct RateLimiterBuilder {
    max_requests: u64,
    window: Duration,
    sweep_interval: Option<Duration>,
}

impl RateLimiterBuilder {
    /// Override the maximum number of requests admitted per window.
    pub fn max_requests(mut self, max_requests: u64) -> Self {
        self.max_requests = max_requests;
        self
    }

    /// Override the window length.
    pub fn window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    /// Override the default sweep interval.
    ///
    /// Set to None to disable the background sweep.
    ///
    /// The sweep periodically scans the entry map, removing expired windows. It only bounds
    /// memory use; admission decisions do not depend on it.
    pub fn sweep_interval(mut self, interval: Option<Duration>) -> Self {
        self.sweep_interval = interval;
        self
    }

    pub fn build(self) -> RateLimiter {
        assert!(self.max_requests > 0, "max_requests must be non-zero");
        assert!(!self.window.is_zero(), "window must be non-zero");
        if let Some(interval) = self.sweep_interval {
            assert!(!interval.is_zero(), "sweep interval must be non-zero");
        }
        let entries = Arc::new(DashMap::<String, Entry>::new());
        let sweep_handle = self
            .sweep_interval
            .map(|interval| Arc::new(RateLimiter::sweeper(entries.clone(), interval)));
        RateLimiter {
            entries,
            max_requests: self.max_requests,
            window: self.window,
            sweep_handle,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINUTE: Duration = Duration::from_secs(60);

    fn limiter(max_requests: u64, window: Duration) -> RateLimiter {
        RateLimiter::builder()
            .max_requests(max_requests)
            .window(window)
            .sweep_interval(None)
            .build()
    }

    #[actix_web::test]
    async fn test_allow_deny() {
        tokio::time::pause();
        let limiter = limiter(5, 15 * MINUTE);
        for expected_remaining in (0..5).rev() {
            // First 5 should be allowed
            let status = limiter.check("1.2.3.4");
            assert!(status.allowed);
            assert_eq!(status.limit, 5);
            assert_eq!(status.remaining, expected_remaining);
        }
        // Sixth should be denied
        let status = limiter.check("1.2.3.4");
        assert!(!status.allowed);
        assert_eq!(status.remaining, 0);
    }

    #[actix_web::test]
    async fn test_fresh_window_after_expiry() {
        tokio::time::pause();
        let limiter = limiter(5, 15 * MINUTE);
        for _ in 0..5 {
            assert!(limiter.check("1.2.3.4").allowed);
        }
        assert!(!limiter.check("1.2.3.4").allowed);
        // Advance past the reset time; the next call starts a fresh window and counts itself.
        tokio::time::advance(15 * MINUTE).await;
        // We want to be sure the entry is still present, and we are testing the expiry logic.
        assert!(limiter.entries.contains_key("1.2.3.4"));
        let status = limiter.check("1.2.3.4");
        assert!(status.allowed);
        assert_eq!(status.remaining, 4);
        assert_eq!(status.reset, Instant::now() + 15 * MINUTE);
    }

    #[actix_web::test]
    async fn test_denied_requests_not_counted() {
        tokio::time::pause();
        let limiter = limiter(2, MINUTE);
        limiter.check("KEY1");
        let filled = limiter.check("KEY1");
        assert!(filled.allowed);
        for _ in 0..3 {
            let status = limiter.check("KEY1");
            assert!(!status.allowed);
            assert_eq!(status.remaining, 0);
            // Rejections change neither the count nor the reset time.
            assert_eq!(status.reset, filled.reset);
        }
        assert_eq!(limiter.entries.get("KEY1").unwrap().count, 2);
    }

    #[actix_web::test]
    async fn test_reset_forgets_identifier() {
        tokio::time::pause();
        let limiter = limiter(1, MINUTE);
        assert!(limiter.check("KEY1").allowed);
        assert!(!limiter.check("KEY1").allowed);
        limiter.reset("KEY1");
        // Behaves as if the identifier had never been seen
        let status = limiter.check("KEY1");
        assert!(status.allowed);
        assert_eq!(status.remaining, 0);
        // Resetting an unknown identifier is a no-op
        limiter.reset("KEY2");
    }

    #[actix_web::test]
    async fn test_identifiers_are_independent() {
        tokio::time::pause();
        let limiter = limiter(1, MINUTE);
        assert!(limiter.check("KEY1").allowed);
        assert!(limiter.check("KEY2").allowed);
        assert!(!limiter.check("KEY1").allowed);
        assert!(!limiter.check("KEY2").allowed);
    }

    #[actix_web::test]
    async fn test_status_output() {
        tokio::time::pause();
        let limiter = limiter(2, MINUTE);
        let status = limiter.check("KEY1");
        assert!(status.allowed);
        assert_eq!(status.limit, 2);
        assert_eq!(status.remaining, 1);
        assert_eq!(status.reset, Instant::now() + MINUTE);
        let status = limiter.check("KEY1");
        assert!(status.allowed);
        assert_eq!(status.remaining, 0);
        assert_eq!(status.reset, Instant::now() + MINUTE);
        let status = limiter.check("KEY1");
        assert!(!status.allowed);
        assert_eq!(status.remaining, 0);
        assert_eq!(status.reset, Instant::now() + MINUTE);
    }

    #[actix_web::test]
    async fn test_sweep() {
        tokio::time::pause();
        let limiter = RateLimiter::builder()
            .max_requests(1)
            .window(MINUTE)
            .sweep_interval(Some(MINUTE))
            .build();
        // Give the freshly spawned sweep task its first poll now, so its periodic schedule anchors
        // at the current instant (as it would on a live runtime that polls it right after spawn).
        // Under a paused clock the task is otherwise not polled until the first `advance` below,
        // which would shift every subsequent sweep by half a window.
        tokio::task::yield_now().await;
        limiter.check("KEY1");
        tokio::time::advance(MINUTE / 2).await;
        limiter.check("KEY2");
        assert!(limiter.entries.contains_key("KEY1"));
        assert!(limiter.entries.contains_key("KEY2"));
        // Advance past the window boundary so the sweep runs; expired KEY1 should be removed, but
        // KEY2's window is still live. The extra millisecond clears tokio's timer deadline, which
        // is rounded up to the next millisecond, so a bare `MINUTE / 2` would land just short.
        tokio::time::advance(MINUTE / 2 + Duration::from_millis(1)).await;
        // Yield so the timer-woken sweep task is actually polled before we inspect the map;
        // `advance` wakes the task but the executor needs another turn to run it.
        tokio::task::yield_now().await;
        assert!(!limiter.entries.contains_key("KEY1"));
        assert!(limiter.entries.contains_key("KEY2"));
    }

    #[actix_web::test]
    async fn test_seconds_until_reset() {
        tokio::time::pause();
        let status = RateLimitStatus {
            allowed: true,
            limit: 0,
            remaining: 0,
            reset: Instant::now() + MINUTE,
        };
        tokio::time::advance(Duration::from_secs_f64(29.9)).await;
        // Verify rounded upwards from 30.1
        assert_eq!(status.seconds_until_reset(), 31);
    }

    #[test]
    #[should_panic(expected = "max_requests must be non-zero")]
    fn test_zero_max_requests() {
        RateLimiter::builder()
            .max_requests(0)
            .sweep_interval(None)
            .build();
    }

    #[test]
    #[should_panic(expected = "window must be non-zero")]
    fn test_zero_window() {
        RateLimiter::builder()
            .window(Duration::ZERO)
            .sweep_interval(None)
            .build();
    }
}

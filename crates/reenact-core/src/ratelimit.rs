//! Sliding-window rate limiter for oracle calls.
//!
//! The perception/planning oracle is a shared, metered external capability.
//! Every call site acquires a permit first; when the window is full the
//! caller blocks, which serializes oracle usage across all compiling and
//! executing workflows in the process.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Rate limits for one external capability.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Maximum calls admitted in any 60-second window.
    pub calls_per_minute: u32,

    /// Maximum calls admitted in any 3600-second window.
    pub calls_per_hour: u32,

    /// Minimum gap between consecutive calls, in milliseconds.
    pub min_interval_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            calls_per_minute: 30,
            calls_per_hour: 1000,
            min_interval_ms: 500,
        }
    }
}

// ---------------------------------------------------------------------------
// Limiter
// ---------------------------------------------------------------------------

/// Statistics for observability.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RateLimitStats {
    pub total_calls: u64,
    pub times_throttled: u64,
    pub calls_in_last_minute: usize,
    pub calls_in_last_hour: usize,
}

#[derive(Default)]
struct Windows {
    minute: VecDeque<Instant>,
    hour: VecDeque<Instant>,
    last_call: Option<Instant>,
    total_calls: u64,
    times_throttled: u64,
}

impl Windows {
    /// Drop expired timestamps and return how long the caller must wait
    /// before the next call is admitted (zero if admitted now).
    fn wait_time(&mut self, config: &RateLimitConfig, now: Instant) -> Duration {
        let mut wait = Duration::ZERO;

        let minute_ago = now - Duration::from_secs(60);
        while self.minute.front().is_some_and(|t| *t < minute_ago) {
            self.minute.pop_front();
        }
        if self.minute.len() >= config.calls_per_minute as usize {
            if let Some(oldest) = self.minute.front() {
                wait = wait.max(*oldest - minute_ago);
            }
        }

        let hour_ago = now - Duration::from_secs(3600);
        while self.hour.front().is_some_and(|t| *t < hour_ago) {
            self.hour.pop_front();
        }
        if self.hour.len() >= config.calls_per_hour as usize {
            if let Some(oldest) = self.hour.front() {
                wait = wait.max(*oldest - hour_ago);
            }
        }

        let min_interval = Duration::from_millis(config.min_interval_ms);
        if let Some(last) = self.last_call {
            let since = now - last;
            if since < min_interval {
                wait = wait.max(min_interval - since);
            }
        }

        wait
    }

    fn record(&mut self, now: Instant) {
        self.minute.push_back(now);
        self.hour.push_back(now);
        self.last_call = Some(now);
        self.total_calls += 1;
    }
}

/// Sliding-window rate limiter shared via `Arc` across workflows.
pub struct RateLimiter {
    name: String,
    config: RateLimitConfig,
    windows: Mutex<Windows>,
}

impl RateLimiter {
    pub fn new(name: impl Into<String>, config: RateLimitConfig) -> Self {
        let name = name.into();
        tracing::debug!(
            limiter = %name,
            per_minute = config.calls_per_minute,
            per_hour = config.calls_per_hour,
            "rate limiter created"
        );
        Self {
            name,
            config,
            windows: Mutex::new(Windows::default()),
        }
    }

    /// Block until the window admits a call, then record it.
    ///
    /// Returns `false` if `timeout` would be exceeded before admission.
    pub async fn acquire(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;

        loop {
            let wait = {
                let mut windows = self.windows.lock().expect("rate limiter poisoned");
                let now = Instant::now();
                let wait = windows.wait_time(&self.config, now);
                if wait.is_zero() {
                    windows.record(now);
                    return true;
                }
                windows.times_throttled += 1;
                wait
            };

            if Instant::now() + wait > deadline {
                tracing::warn!(limiter = %self.name, "rate limit acquire timed out");
                return false;
            }

            tracing::debug!(limiter = %self.name, wait = ?wait, "rate limited, waiting");
            tokio::time::sleep(wait).await;
        }
    }

    /// Acquire without waiting; `false` means a wait would be required.
    pub fn try_acquire(&self) -> bool {
        let mut windows = self.windows.lock().expect("rate limiter poisoned");
        let now = Instant::now();
        if windows.wait_time(&self.config, now).is_zero() {
            windows.record(now);
            true
        } else {
            false
        }
    }

    pub fn stats(&self) -> RateLimitStats {
        let mut windows = self.windows.lock().expect("rate limiter poisoned");
        let now = Instant::now();
        // Refresh the windows so the counts reflect the current moment.
        let _ = windows.wait_time(&self.config, now);
        RateLimitStats {
            total_calls: windows.total_calls,
            times_throttled: windows.times_throttled,
            calls_in_last_minute: windows.minute.len(),
            calls_in_last_hour: windows.hour.len(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn tight_config() -> RateLimitConfig {
        RateLimitConfig {
            calls_per_minute: 2,
            calls_per_hour: 100,
            min_interval_ms: 0,
        }
    }

    #[tokio::test]
    async fn admits_up_to_window_capacity() {
        let limiter = RateLimiter::new("test", tight_config());
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
    }

    #[tokio::test(start_paused = true)]
    async fn window_frees_up_after_a_minute() {
        let limiter = RateLimiter::new("test", tight_config());
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(limiter.try_acquire());
    }

    #[tokio::test(start_paused = true)]
    async fn min_interval_enforced() {
        let config = RateLimitConfig {
            calls_per_minute: 100,
            calls_per_hour: 1000,
            min_interval_ms: 500,
        };
        let limiter = RateLimiter::new("test", config);
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());

        tokio::time::advance(Duration::from_millis(600)).await;
        assert!(limiter.try_acquire());
    }

    #[tokio::test(start_paused = true)]
    async fn acquire_blocks_until_admitted() {
        let limiter = RateLimiter::new("test", tight_config());
        assert!(limiter.acquire(Duration::from_secs(120)).await);
        assert!(limiter.acquire(Duration::from_secs(120)).await);
        // Third call must wait for the window; paused clock auto-advances.
        assert!(limiter.acquire(Duration::from_secs(120)).await);
        assert!(limiter.stats().times_throttled >= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn acquire_times_out() {
        let limiter = RateLimiter::new("test", tight_config());
        assert!(limiter.acquire(Duration::from_secs(120)).await);
        assert!(limiter.acquire(Duration::from_secs(120)).await);
        assert!(!limiter.acquire(Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn stats_track_calls() {
        let limiter = RateLimiter::new("test", RateLimitConfig::default());
        limiter.try_acquire();
        let stats = limiter.stats();
        assert_eq!(stats.total_calls, 1);
        assert_eq!(stats.calls_in_last_minute, 1);
    }
}

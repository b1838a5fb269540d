//! Optional per-engine byte-rate cap — `spec.md` §4.6.
//!
//! Grounded on `apply_speed_limit` in
//! `examples/original_source/turbo_get/engine.py`. The limiter shares the
//! monitor's clock (`last_time`) rather than giving each worker an
//! independent clock — `spec.md` §9 calls this drift-prone but explicitly
//! accepts it as one of two valid designs; `DESIGN.md` records the choice.

use std::sync::atomic::{AtomicU64, Ordering};
use tokio::time::{Duration, Instant};

/// Shared rate-limiting state. `limit_bytes_per_sec == 0` means unset.
pub struct RateLimiter {
    limit_bytes_per_sec: AtomicU64,
    /// Millisecond timestamp (relative to an arbitrary epoch) of the last
    /// pacing sample, shared with the throughput monitor.
    last_sample: AtomicU64,
    epoch: Instant,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            limit_bytes_per_sec: AtomicU64::new(0),
            last_sample: AtomicU64::new(0),
            epoch: Instant::now(),
        }
    }

    pub fn set_limit(&self, bytes_per_sec: Option<u64>) {
        self.limit_bytes_per_sec
            .store(bytes_per_sec.unwrap_or(0), Ordering::Relaxed);
    }

    pub fn is_enabled(&self) -> bool {
        self.limit_bytes_per_sec.load(Ordering::Relaxed) > 0
    }

    /// Marks "now" as the pacing reference point. Called once when the
    /// limiter is first engaged and refreshed by the monitor each second,
    /// mirroring `last_time` in the original implementation.
    pub fn mark_now(&self) {
        let now_ms = self.epoch.elapsed().as_millis() as u64;
        self.last_sample.store(now_ms, Ordering::Relaxed);
    }

    /// After writing `bytes_written` bytes, sleeps long enough that the
    /// average rate since the last sample does not exceed the configured
    /// limit.
    pub async fn pace(&self, bytes_written: u64) {
        let limit = self.limit_bytes_per_sec.load(Ordering::Relaxed);
        if limit == 0 {
            return;
        }

        let expected = Duration::from_secs_f64(bytes_written as f64 / limit as f64);
        let last_ms = self.last_sample.load(Ordering::Relaxed);
        let now_ms = self.epoch.elapsed().as_millis() as u64;
        let actual = Duration::from_millis(now_ms.saturating_sub(last_ms));

        if expected > actual {
            tokio::time::sleep(expected - actual).await;
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

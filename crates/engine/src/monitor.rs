//! Throughput monitor — `spec.md` §4.7.
//!
//! Grounded on `monitor_speed` in
//! `examples/original_source/turbo_get/engine.py`: wakes once a second,
//! computes instantaneous speed from the delta against the last sample,
//! pushes it into a bounded ring, and reports `(instant, moving_average)`.

use crate::callbacks::SpeedCallback;
use crate::ratelimit::RateLimiter;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{interval, Duration};

const HISTORY_CAPACITY: usize = 100;

/// Runs until `stopped` is set, sampling `downloaded_size` once a second.
pub(crate) async fn run(
    downloaded_size: Arc<AtomicU64>,
    stopped: Arc<AtomicBool>,
    rate_limiter: Arc<RateLimiter>,
    speed_callback: Option<SpeedCallback>,
) {
    let mut ticker = interval(Duration::from_secs(1));
    let mut history: VecDeque<f64> = VecDeque::with_capacity(HISTORY_CAPACITY);
    let mut last_downloaded = downloaded_size.load(Ordering::Relaxed);
    let mut last_time = Instant::now();

    loop {
        ticker.tick().await;
        if stopped.load(Ordering::Relaxed) {
            return;
        }

        let now = Instant::now();
        let elapsed = now.duration_since(last_time).as_secs_f64();
        if elapsed <= 0.0 {
            continue;
        }

        let current = downloaded_size.load(Ordering::Relaxed);
        let bytes_diff = current.saturating_sub(last_downloaded);
        let speed = bytes_diff as f64 / elapsed;

        if history.len() == HISTORY_CAPACITY {
            history.pop_front();
        }
        history.push_back(speed);

        last_downloaded = current;
        last_time = now;
        rate_limiter.mark_now();

        if let Some(cb) = &speed_callback {
            let avg = history.iter().sum::<f64>() / history.len() as f64;
            cb(speed, avg);
        }
    }
}

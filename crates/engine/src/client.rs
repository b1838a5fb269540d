//! Shared HTTP client construction.
//!
//! Grounded on `HttpDownloader::new`/`ChunkedDownloader::new` in the
//! teacher's `crates/engine/src/http.rs` and `chunked.rs`, generalized per
//! `spec.md` §6: per-host connection cap equal to the worker count, fixed
//! `User-Agent`, transparent decompression, redirects followed on probes.

use reqwest::Client;
use std::time::Duration;

pub(crate) fn build(worker_count: u32) -> Client {
    Client::builder()
        .user_agent("TurboGet/1.0")
        .pool_max_idle_per_host(worker_count.max(1) as usize)
        .redirect(reqwest::redirect::Policy::limited(10))
        .connect_timeout(Duration::from_secs(30))
        .read_timeout(Duration::from_secs(30))
        .build()
        .expect("failed to build HTTP client")
}

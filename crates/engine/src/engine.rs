//! Control surface and orchestration — `spec.md` §2 control flow and §4.10.
//!
//! Grounded on `DownloadEngine` in
//! `examples/original_source/turbo_get/engine.py`, restructured around
//! `tokio::spawn` workers/monitor and the teacher's async-`reqwest`-plus-
//! `tokio::fs` idiom (`crates/engine/src/chunked.rs`).

use crate::callbacks::{ProgressCallback, SpeedCallback, StatusCallback};
use crate::capabilities::{self, ServerCapabilities};
use crate::chunk::ChunkInfo;
use crate::error::EngineError;
use crate::metadata;
use crate::preallocate;
use crate::ratelimit::RateLimiter;
use crate::verify::{self, VerifyOutcome};
use crate::worker;

use chrono::{DateTime, Utc};
use reqwest::Client;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex as AsyncMutex;

/// State shared between the engine's control surface, its workers, and its
/// monitor task. `Arc`-cloned into each spawned task; the engine outlives
/// all of them for the duration of `download()`.
pub(crate) struct Shared {
    pub client: Client,
    pub url: String,
    pub mirrors: StdMutex<Vec<String>>,
    pub current_mirror_index: AtomicUsize,
    pub output_path: PathBuf,
    pub sidecar_path: PathBuf,
    pub created_at: DateTime<Utc>,

    pub total_size: AtomicU64,
    pub supports_range: AtomicBool,
    pub supports_resume: AtomicBool,

    pub chunks: AsyncMutex<Vec<ChunkInfo>>,
    pub downloaded_size: Arc<AtomicU64>,

    pub paused: AtomicBool,
    pub stopped: Arc<AtomicBool>,

    pub rate_limiter: Arc<RateLimiter>,

    pub progress_cb: StdMutex<Option<ProgressCallback>>,
    pub speed_cb: StdMutex<Option<SpeedCallback>>,
    pub status_cb: StdMutex<Option<StatusCallback>>,
}

impl Shared {
    pub(crate) fn report_status(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::info!(target: "engine::status", "{}", message);
        if let Some(cb) = self.status_cb.lock().unwrap().clone() {
            cb(message);
        }
    }

    pub(crate) fn report_progress(&self, downloaded: u64, total: u64) {
        if let Some(cb) = self.progress_cb.lock().unwrap().clone() {
            cb(downloaded, total);
        }
    }

    /// The URL a worker should fetch from right now: the current mirror if
    /// any are configured, else the primary URL. `spec.md` §4.11.
    pub(crate) fn current_url(&self) -> String {
        let mirrors = self.mirrors.lock().unwrap();
        let index = self.current_mirror_index.load(Ordering::Relaxed);
        mirrors
            .get(index)
            .cloned()
            .unwrap_or_else(|| self.url.clone())
    }

    /// Advances to the next mirror, wrapping. Triggered by the retry
    /// controller after a chunk exhausts `max_retries` against the current
    /// URL — the concrete rotation trigger `spec.md` §9 asks for.
    pub(crate) fn rotate_mirror(&self) {
        let mirrors = self.mirrors.lock().unwrap();
        if mirrors.is_empty() {
            return;
        }
        let len = mirrors.len();
        let _ = self
            .current_mirror_index
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |i| Some((i + 1) % len));
    }
}

/// A single-resource accelerated download, bound to one `(url, output_path)`
/// pair for its entire lifetime. Create one per download.
pub struct DownloadEngine {
    shared: Arc<Shared>,
    num_threads: AtomicU64,
}

impl DownloadEngine {
    /// Constructs a new engine. Fails only on invalid arguments — the
    /// transfer itself never surfaces errors to the caller (`spec.md` §7).
    pub fn new(
        url: impl Into<String>,
        output_path: impl Into<PathBuf>,
        num_threads: u32,
    ) -> Result<Self, EngineError> {
        let url = url.into();
        if url.trim().is_empty() {
            return Err(EngineError::EmptyUrl);
        }
        if num_threads == 0 {
            return Err(EngineError::ZeroWorkers);
        }
        let output_path = output_path.into();
        if output_path.parent().is_none() {
            return Err(EngineError::NoParentDirectory);
        }

        let sidecar_path = metadata::sidecar_path(&output_path);

        let shared = Arc::new(Shared {
            client: crate::client::build(num_threads),
            url,
            mirrors: StdMutex::new(Vec::new()),
            current_mirror_index: AtomicUsize::new(0),
            output_path,
            sidecar_path,
            created_at: Utc::now(),
            total_size: AtomicU64::new(0),
            supports_range: AtomicBool::new(false),
            supports_resume: AtomicBool::new(false),
            chunks: AsyncMutex::new(Vec::new()),
            downloaded_size: Arc::new(AtomicU64::new(0)),
            paused: AtomicBool::new(false),
            stopped: Arc::new(AtomicBool::new(false)),
            rate_limiter: Arc::new(RateLimiter::new()),
            progress_cb: StdMutex::new(None),
            speed_cb: StdMutex::new(None),
            status_cb: StdMutex::new(None),
        });

        Ok(Self {
            shared,
            num_threads: AtomicU64::new(num_threads as u64),
        })
    }

    pub fn on_progress(&self, f: impl Fn(u64, u64) + Send + Sync + 'static) {
        *self.shared.progress_cb.lock().unwrap() = Some(Arc::new(f));
    }

    pub fn on_speed(&self, f: impl Fn(f64, f64) + Send + Sync + 'static) {
        *self.shared.speed_cb.lock().unwrap() = Some(Arc::new(f));
    }

    pub fn on_status(&self, f: impl Fn(String) + Send + Sync + 'static) {
        *self.shared.status_cb.lock().unwrap() = Some(Arc::new(f));
    }

    pub fn set_mirrors(&self, mirrors: Vec<String>) {
        *self.shared.mirrors.lock().unwrap() = mirrors;
    }

    pub fn get_current_url(&self) -> String {
        self.shared.current_url()
    }

    /// `!paused && !stopped`, per `spec.md` §6.
    pub fn is_running(&self) -> bool {
        !self.shared.paused.load(Ordering::Relaxed)
            && !self.shared.stopped.load(Ordering::Relaxed)
    }

    pub fn pause(&self) {
        self.shared.paused.store(true, Ordering::Relaxed);
        self.shared.report_status("Download paused.");
    }

    pub fn resume(&self) {
        self.shared.paused.store(false, Ordering::Relaxed);
        self.shared.report_status("Download resumed.");
    }

    pub fn stop(&self) {
        self.shared.stopped.store(true, Ordering::Relaxed);
        self.shared.report_status("Download stopping...");
    }

    /// Sets (or clears) the speed limit in kilobytes/sec, matching the
    /// original's `set_speed_limit`.
    pub fn set_speed_limit(&self, kbps: Option<f64>) {
        let bytes = kbps.map(|k| (k * 1024.0).max(0.0) as u64);
        self.shared.rate_limiter.set_limit(bytes);
        if bytes.is_some() {
            self.shared.rate_limiter.mark_now();
        }
    }

    /// Current aggregate downloaded size, for callers that want to poll
    /// instead of (or in addition to) subscribing to `on_progress`.
    pub fn downloaded_size(&self) -> u64 {
        self.shared.downloaded_size.load(Ordering::Relaxed)
    }

    pub fn total_size(&self) -> u64 {
        self.shared.total_size.load(Ordering::Relaxed)
    }

    /// Runs the full download: probe, plan (or restore), preallocate, spawn
    /// workers and a monitor, join, verify, clean up. Never returns an
    /// error — every non-fatal condition becomes a `status()` message, per
    /// `spec.md` §7.
    pub async fn download(&self) {
        let shared = &self.shared;

        shared.report_status("Detecting server capabilities...");
        let probe = capabilities::probe(&shared.client, &shared.url).await;
        self.apply_probe(&probe.capabilities, probe.total_size);

        shared.report_status(format!(
            "Server supports range: {}. Total size: {:.2} MB",
            probe.capabilities.supports_range,
            probe.total_size as f64 / (1024.0 * 1024.0)
        ));

        let num_threads = self.effective_worker_count();
        let total_size = shared.total_size.load(Ordering::Relaxed);
        let supports_range = shared.supports_range.load(Ordering::Relaxed);

        let already_complete = self
            .prepare_chunks(total_size, num_threads, supports_range)
            .await;
        if already_complete {
            self.verify_and_cleanup(total_size).await;
            return;
        }

        if let Err(e) = preallocate::preallocate(&shared.output_path, total_size).await {
            shared.report_status(format!("Failed to preallocate destination: {e}"));
            return;
        }

        let worker_handles: Vec<_> = (0..num_threads)
            .map(|id| {
                let shared = shared.clone();
                tokio::spawn(async move { worker::run(shared, id).await })
            })
            .collect();

        let monitor_handle = tokio::spawn(crate::monitor::run(
            shared.downloaded_size.clone(),
            shared.stopped.clone(),
            shared.rate_limiter.clone(),
            shared.speed_cb.lock().unwrap().clone(),
        ));

        for handle in worker_handles {
            let _ = handle.await;
        }
        monitor_handle.abort();

        if shared.stopped.load(Ordering::Relaxed) {
            if shared.supports_resume.load(Ordering::Relaxed) {
                let mirrors = shared.mirrors.lock().unwrap().clone();
                let chunks = shared.chunks.lock().await.clone();
                metadata::save(
                    &shared.sidecar_path,
                    &shared.url,
                    &file_name(&shared.output_path),
                    total_size,
                    &chunks,
                    shared.created_at,
                    true,
                    &mirrors,
                )
                .await
                .ok();
            }
            return;
        }

        let all_chunks_completed = {
            let chunks = shared.chunks.lock().await;
            !chunks.is_empty() && chunks.iter().all(|c| c.completed)
        };
        if !all_chunks_completed {
            // The destination is preallocated to its full size up front, so a
            // plain file-size check can't tell a complete transfer from one
            // with a permanently failed chunk; the chunk table is the source
            // of truth for completeness. The sidecar is kept so a later
            // attempt can resume.
            shared.report_status(
                "Download incomplete: one or more chunks failed after all retries.",
            );
            return;
        }

        self.verify_and_cleanup(total_size).await;
    }

    fn apply_probe(&self, caps: &ServerCapabilities, total_size: u64) {
        let shared = &self.shared;
        shared.total_size.store(total_size, Ordering::Relaxed);
        shared
            .supports_range
            .store(caps.supports_range, Ordering::Relaxed);
        shared
            .supports_resume
            .store(caps.supports_resume, Ordering::Relaxed);
        if !caps.supports_range {
            self.num_threads.store(1, Ordering::Relaxed);
        }
    }

    fn effective_worker_count(&self) -> u32 {
        self.num_threads.load(Ordering::Relaxed) as u32
    }

    /// Restores chunk state from the sidecar, plans a fresh chunk table, or
    /// — when there's no sidecar but the destination already exists fully
    /// populated — reports the transfer as already complete. Returns `true`
    /// in that last case, telling `download()` to skip straight to
    /// verification instead of re-fetching data it already has (`spec.md`
    /// §8, idempotent-resume property).
    async fn prepare_chunks(&self, total_size: u64, num_threads: u32, supports_range: bool) -> bool {
        let shared = &self.shared;
        if let Some(restored) = metadata::load(&shared.sidecar_path, &shared.url, total_size).await
        {
            let downloaded: u64 = restored.chunks.iter().map(|c| c.downloaded).sum();
            shared
                .downloaded_size
                .store(downloaded, Ordering::Relaxed);
            *shared.mirrors.lock().unwrap() = restored.mirrors;
            *shared.chunks.lock().await = restored
                .chunks
                .into_iter()
                .map(|mut c| {
                    c.worker_id = None;
                    // A chunk can be fully written without `completed` having
                    // been persisted (e.g. a crash between the last write and
                    // the completion flag being set); `is_fully_claimed_range`
                    // catches that so the claim scan doesn't re-request a
                    // range that has nothing left to fetch.
                    c.completed = c.completed || c.is_fully_claimed_range();
                    c
                })
                .collect();
            shared.report_status(format!(
                "Resuming download. {:.2} MB already downloaded.",
                downloaded as f64 / (1024.0 * 1024.0)
            ));
            return false;
        }

        if total_size > 0 {
            if let Ok(metadata) = tokio::fs::metadata(&shared.output_path).await {
                if metadata.len() == total_size {
                    shared.report_status(
                        "Destination already complete; skipping straight to verification.",
                    );
                    return true;
                }
            }
        }

        let chunks = ChunkInfo::plan(total_size, num_threads, supports_range);
        *shared.chunks.lock().await = chunks;
        false
    }

    async fn verify_and_cleanup(&self, total_size: u64) {
        let shared = &self.shared;
        shared.report_status("Verifying download...");
        match verify::verify(&shared.output_path, total_size).await {
            Ok(VerifyOutcome::Missing) => {
                shared.report_status("Verification failed: File not found.");
            }
            Ok(VerifyOutcome::SizeMismatch { expected, actual }) => {
                shared.report_status(format!(
                    "Verification failed: Size mismatch. Expected: {expected}, Got: {actual}"
                ));
            }
            Ok(VerifyOutcome::Ok { digest }) => {
                shared.report_status(format!("Verification complete. SHA256: {digest}..."));
                metadata::delete(&shared.sidecar_path).await;
            }
            Err(e) => {
                shared.report_status(format!("Verification failed: {e}"));
            }
        }
    }
}

fn file_name(path: &std::path::Path) -> String {
    path.to_string_lossy().into_owned()
}

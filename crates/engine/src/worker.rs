//! Worker pool, claim protocol, and per-chunk retry — `spec.md` §4.4/§4.5.
//!
//! Grounded on `download_chunk_with_retry`/`download_chunk` in
//! `examples/original_source/turbo_get/engine.py` and the positional-write
//! idiom from the teacher's `crates/engine/src/chunked.rs`
//! (`download_chunk`), generalized to operate against a shared chunk vector
//! behind a single claim mutex instead of one `Chunk` per spawned task.

use crate::chunk::ChunkInfo;
use crate::engine::Shared;
use crate::error::TransferError;
use futures_util::StreamExt;
use std::io::SeekFrom;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio::time::{sleep, Duration};

const MAX_RETRIES: u32 = 5;
const BLOCK_SIZE: usize = 8 * 1024;

enum AttemptOutcome {
    Success,
    Stopped,
    Failed(TransferError),
}

/// The main loop for one cooperative worker: claim, download-with-retry,
/// repeat until no chunk remains or the engine is stopped.
pub(crate) async fn run(shared: Arc<Shared>, worker_id: u32) {
    loop {
        if shared.stopped.load(Ordering::Relaxed) {
            return;
        }

        while shared.paused.load(Ordering::Relaxed) {
            sleep(Duration::from_millis(100)).await;
            if shared.stopped.load(Ordering::Relaxed) {
                return;
            }
        }

        let idx = match claim_next_chunk(&shared, worker_id).await {
            Some(idx) => idx,
            None => return,
        };

        let chunk = { shared.chunks.lock().await[idx].clone() };

        if download_chunk_with_retry(&shared, idx, chunk, worker_id).await {
            persist_metadata(&shared).await;
        } else {
            shared.report_status(format!(
                "Worker {worker_id}: Chunk failed after all retries."
            ));
        }
    }
}

/// Scans the chunk vector in order, atomically claiming the first
/// incomplete, unclaimed chunk. `spec.md` §4.4: "the claim scan must be
/// serialized."
async fn claim_next_chunk(shared: &Shared, worker_id: u32) -> Option<usize> {
    let mut chunks = shared.chunks.lock().await;
    for (i, chunk) in chunks.iter_mut().enumerate() {
        if !chunk.completed && chunk.worker_id.is_none() {
            chunk.worker_id = Some(worker_id);
            return Some(i);
        }
    }
    None
}

async fn download_chunk_with_retry(
    shared: &Shared,
    idx: usize,
    mut chunk: ChunkInfo,
    worker_id: u32,
) -> bool {
    for attempt in 0..MAX_RETRIES {
        if shared.stopped.load(Ordering::Relaxed) {
            return false;
        }

        match attempt_chunk(shared, &mut chunk).await {
            AttemptOutcome::Success => {
                let mut chunks = shared.chunks.lock().await;
                chunks[idx].downloaded = chunk.downloaded;
                chunks[idx].completed = true;
                return true;
            }
            AttemptOutcome::Stopped => {
                let mut chunks = shared.chunks.lock().await;
                chunks[idx].downloaded = chunk.downloaded;
                return false;
            }
            AttemptOutcome::Failed(err) => {
                chunk.retries += 1;
                {
                    let mut chunks = shared.chunks.lock().await;
                    chunks[idx].retries = chunk.retries;
                    chunks[idx].downloaded = chunk.downloaded;
                }
                let wait_secs = 2u64.saturating_pow(attempt).min(30);
                tracing::warn!(worker_id, attempt, %err, "chunk attempt failed");
                shared.report_status(format!(
                    "Worker {worker_id} (Retry {}/{MAX_RETRIES}): {err}. Retrying in {wait_secs}s.",
                    attempt + 1
                ));
                sleep(Duration::from_secs(wait_secs)).await;
            }
        }
    }

    shared.rotate_mirror();
    false
}

async fn attempt_chunk(shared: &Shared, chunk: &mut ChunkInfo) -> AttemptOutcome {
    let start = chunk.resume_position();
    let end = chunk.end;
    let supports_range = shared.supports_range.load(Ordering::Relaxed);
    let range_valid = supports_range && end >= 0 && (start as i64) <= end;

    let url = shared.current_url();
    let mut request = shared.client.get(&url);
    if range_valid {
        request = request.header("Range", format!("bytes={start}-{end}"));
    }

    let response = match request.send().await {
        Ok(r) => r,
        Err(e) => return AttemptOutcome::Failed(e.into()),
    };

    let status = response.status();
    if status.as_u16() != 200 && status.as_u16() != 206 {
        return AttemptOutcome::Failed(TransferError::Http(status.as_u16()));
    }

    let mut file = match OpenOptions::new()
        .read(true)
        .write(true)
        .open(&shared.output_path)
        .await
    {
        Ok(f) => f,
        Err(e) => return AttemptOutcome::Failed(e.into()),
    };

    if let Err(e) = file.seek(SeekFrom::Start(start)).await {
        return AttemptOutcome::Failed(e.into());
    }

    let mut stream = response.bytes_stream();
    let mut buffer: Vec<u8> = Vec::with_capacity(BLOCK_SIZE);

    loop {
        if shared.stopped.load(Ordering::Relaxed) {
            return AttemptOutcome::Stopped;
        }

        let next = stream.next().await;
        let data = match next {
            Some(Ok(bytes)) => bytes,
            Some(Err(e)) => return AttemptOutcome::Failed(e.into()),
            None => break,
        };

        buffer.extend_from_slice(&data);

        while buffer.len() >= BLOCK_SIZE {
            if shared.stopped.load(Ordering::Relaxed) {
                return AttemptOutcome::Stopped;
            }
            let block: Vec<u8> = buffer.drain(..BLOCK_SIZE).collect();
            if let Err(outcome) = write_block(shared, chunk, &mut file, &block).await {
                return outcome;
            }
        }
    }

    if !buffer.is_empty() {
        let block = std::mem::take(&mut buffer);
        if let Err(outcome) = write_block(shared, chunk, &mut file, &block).await {
            return outcome;
        }
    }

    chunk.completed = true;
    AttemptOutcome::Success
}

async fn write_block(
    shared: &Shared,
    chunk: &mut ChunkInfo,
    file: &mut tokio::fs::File,
    block: &[u8],
) -> Result<(), AttemptOutcome> {
    if shared.rate_limiter.is_enabled() {
        shared.rate_limiter.pace(block.len() as u64).await;
    }

    file.write_all(block)
        .await
        .map_err(|e| AttemptOutcome::Failed(e.into()))?;

    chunk.downloaded += block.len() as u64;
    let downloaded_size = shared
        .downloaded_size
        .fetch_add(block.len() as u64, Ordering::Relaxed)
        + block.len() as u64;
    shared.report_progress(downloaded_size, shared.total_size.load(Ordering::Relaxed));

    Ok(())
}

async fn persist_metadata(shared: &Shared) {
    if !shared.supports_resume.load(Ordering::Relaxed) {
        return;
    }
    let chunks = shared.chunks.lock().await.clone();
    let mirrors = shared.mirrors.lock().unwrap().clone();
    if let Err(e) = crate::metadata::save(
        &shared.sidecar_path,
        &shared.url,
        &shared.output_path.to_string_lossy(),
        shared.total_size.load(Ordering::Relaxed),
        &chunks,
        shared.created_at,
        true,
        &mirrors,
    )
    .await
    {
        shared.report_status(format!("Error saving metadata: {e}"));
    }
}

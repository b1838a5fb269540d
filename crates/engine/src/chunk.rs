//! Chunk data model and planning.
//!
//! Grounded on `Chunk`/`calculate_chunks` in the teacher's
//! `crates/engine/src/chunked.rs`, generalized to the byte-range-plus-resume
//! shape `spec.md` §3/§4.2 describes.

use serde::{Deserialize, Serialize};

/// A contiguous byte range of the remote resource, assigned to at most one
/// worker at a time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkInfo {
    /// Starting byte offset (inclusive).
    pub start: u64,
    /// Ending byte offset (inclusive). `end < start` is the "stream until
    /// EOF" sentinel used when the total size is unknown.
    pub end: i64,
    /// Bytes already written for this chunk.
    pub downloaded: u64,
    /// True once `downloaded` covers the whole range and the stream hit EOF.
    pub completed: bool,
    /// Lifetime retry counter. Diagnostic only; never reset across sessions.
    pub retries: u32,
    /// Identity of the current claimant, if any.
    pub worker_id: Option<u32>,
    /// Most recent instantaneous speed observed for this chunk, bytes/sec.
    /// Carried in the sidecar for display purposes only.
    #[serde(default)]
    pub speed: f64,
}

impl ChunkInfo {
    fn new(start: u64, end: i64) -> Self {
        Self {
            start,
            end,
            downloaded: 0,
            completed: false,
            retries: 0,
            worker_id: None,
            speed: 0.0,
        }
    }

    /// Size of the range in bytes, if bounded.
    pub fn size(&self) -> Option<u64> {
        if self.end < 0 {
            None
        } else {
            Some(self.end as u64 - self.start + 1)
        }
    }

    /// True if this chunk has no more bytes to request (bounded chunks
    /// only; an unbounded chunk is only "complete" once the stream EOFs,
    /// which `completed` tracks directly).
    pub fn is_fully_claimed_range(&self) -> bool {
        match self.size() {
            Some(size) => self.downloaded >= size,
            None => false,
        }
    }

    /// Next absolute byte offset to resume from.
    pub fn resume_position(&self) -> u64 {
        self.start + self.downloaded
    }

    /// Partitions `[0, total_size - 1]` into `worker_count` contiguous
    /// chunks, or produces a single chunk when ranges aren't supported or
    /// the size is unknown. Mirrors `spec.md` §4.2 exactly.
    pub fn plan(total_size: u64, worker_count: u32, supports_range: bool) -> Vec<ChunkInfo> {
        if supports_range && total_size > 0 {
            let worker_count = worker_count.max(1) as u64;
            let chunk_size = total_size / worker_count;
            let mut chunks = Vec::with_capacity(worker_count as usize);
            let mut start = 0u64;
            for i in 0..worker_count {
                let end = if i == worker_count - 1 {
                    total_size - 1
                } else {
                    start + chunk_size - 1
                };
                chunks.push(ChunkInfo::new(start, end as i64));
                start = end + 1;
            }
            chunks
        } else if total_size > 0 {
            vec![ChunkInfo::new(0, total_size as i64 - 1)]
        } else {
            vec![ChunkInfo::new(0, -1)]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_splits_contiguous_chunks() {
        let chunks = ChunkInfo::plan(1_000_000, 4, true);
        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[0].start, 0);
        assert_eq!(chunks[0].end, 249_999);
        assert_eq!(chunks[1].start, 250_000);
        assert_eq!(chunks[1].end, 499_999);
        assert_eq!(chunks[2].start, 500_000);
        assert_eq!(chunks[2].end, 749_999);
        assert_eq!(chunks[3].start, 750_000);
        assert_eq!(chunks[3].end, 999_999);
    }

    #[test]
    fn plan_last_chunk_absorbs_remainder() {
        let chunks = ChunkInfo::plan(1_000_003, 4, true);
        let total: u64 = chunks.iter().map(|c| c.size().unwrap()).sum();
        assert_eq!(total, 1_000_003);
        assert_eq!(chunks.last().unwrap().end, 1_000_002);
    }

    #[test]
    fn plan_without_range_support_is_single_chunk() {
        let chunks = ChunkInfo::plan(1_000_000, 8, false);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].start, 0);
        assert_eq!(chunks[0].end, 999_999);
    }

    #[test]
    fn plan_unknown_size_is_eof_sentinel() {
        let chunks = ChunkInfo::plan(0, 8, true);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].start, 0);
        assert_eq!(chunks[0].end, -1);
    }

    #[test]
    fn chunks_are_disjoint_and_cover_the_range() {
        let chunks = ChunkInfo::plan(10_000_001, 7, true);
        for pair in chunks.windows(2) {
            assert_eq!(pair[0].end + 1, pair[1].start as i64);
        }
        assert_eq!(chunks[0].start, 0);
        assert_eq!(chunks.last().unwrap().end, 10_000_000);
    }

    #[test]
    fn resume_position_accounts_for_progress() {
        let mut chunk = ChunkInfo::new(100, 999);
        chunk.downloaded = 50;
        assert_eq!(chunk.resume_position(), 150);
        assert_eq!(chunk.size(), Some(900));
        assert!(!chunk.is_fully_claimed_range());
        chunk.downloaded = 900;
        assert!(chunk.is_fully_claimed_range());
    }
}

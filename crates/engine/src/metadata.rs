//! Resume metadata sidecar — `spec.md` §4.8.
//!
//! Grounded on `save_metadata`/`load_metadata` in
//! `examples/original_source/turbo_get/engine.py`; the on-disk schema is
//! kept schema-agnostic from the in-memory `ChunkInfo` layout per `spec.md`
//! §9's re-architecture guidance (a parse failure, or a semantic mismatch on
//! `url`/`total_size`, discards the sidecar and starts fresh — it never
//! propagates as an error).

use crate::chunk::ChunkInfo;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// On-disk resume sidecar document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadMetadata {
    pub url: String,
    pub filename: String,
    pub total_size: u64,
    pub chunks: Vec<ChunkInfo>,
    pub created_at: DateTime<Utc>,
    pub supports_resume: bool,
    #[serde(default)]
    pub checksum: Option<String>,
    #[serde(default)]
    pub mirrors: Vec<String>,
}

/// Derives the sidecar path for a destination file: the full destination
/// path with `.metadata` appended, unconditionally. Resolves the Open
/// Question in `spec.md` §9 with one deterministic rule that doesn't need
/// to special-case extension-less files.
pub fn sidecar_path(destination: &Path) -> PathBuf {
    let mut os_string = destination.as_os_str().to_owned();
    os_string.push(".metadata");
    PathBuf::from(os_string)
}

/// Serializes the current state to the sidecar as a whole-file replacement.
/// I/O failures are reported to the caller so the engine can turn them into
/// a status message; they are never fatal.
pub async fn save(
    sidecar: &Path,
    url: &str,
    filename: &str,
    total_size: u64,
    chunks: &[ChunkInfo],
    created_at: DateTime<Utc>,
    supports_resume: bool,
    mirrors: &[String],
) -> std::io::Result<()> {
    let metadata = DownloadMetadata {
        url: url.to_string(),
        filename: filename.to_string(),
        total_size,
        chunks: chunks.to_vec(),
        created_at,
        supports_resume,
        checksum: None,
        mirrors: mirrors.to_vec(),
    };
    let json = serde_json::to_string_pretty(&metadata)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
    tokio::fs::write(sidecar, json).await
}

/// Loads the sidecar, validating it against the live probe's `url` and
/// `total_size`. Returns `None` (and deletes the sidecar, best-effort) on
/// any parse error or mismatch — "no resume" is never an error condition.
pub async fn load(sidecar: &Path, url: &str, total_size: u64) -> Option<DownloadMetadata> {
    let contents = match tokio::fs::read_to_string(sidecar).await {
        Ok(c) => c,
        Err(_) => return None,
    };

    let parsed: DownloadMetadata = match serde_json::from_str(&contents) {
        Ok(m) => m,
        Err(e) => {
            tracing::warn!(error = %e, "failed to parse sidecar, discarding");
            let _ = tokio::fs::remove_file(sidecar).await;
            return None;
        }
    };

    if parsed.url != url || parsed.total_size != total_size {
        tracing::info!("sidecar metadata mismatch, starting fresh");
        let _ = tokio::fs::remove_file(sidecar).await;
        return None;
    }

    Some(parsed)
}

/// Deletes the sidecar if present. Used after successful verification.
pub async fn delete(sidecar: &Path) {
    let _ = tokio::fs::remove_file(sidecar).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sidecar_path_appends_unconditionally() {
        assert_eq!(
            sidecar_path(Path::new("movie.mp4")),
            PathBuf::from("movie.mp4.metadata")
        );
        assert_eq!(
            sidecar_path(Path::new("LICENSE")),
            PathBuf::from("LICENSE.metadata")
        );
        assert_eq!(
            sidecar_path(Path::new("/tmp/dir/archive.tar.gz")),
            PathBuf::from("/tmp/dir/archive.tar.gz.metadata")
        );
    }

    #[tokio::test]
    async fn round_trips_through_save_and_load() {
        let dir = std::env::temp_dir().join(format!("turbo_get_meta_{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let sidecar = dir.join("out.bin.metadata");

        let chunks = ChunkInfo::plan(1000, 2, true);
        save(
            &sidecar,
            "http://example.test/file",
            "out.bin",
            1000,
            &chunks,
            Utc::now(),
            true,
            &[],
        )
        .await
        .unwrap();

        let loaded = load(&sidecar, "http://example.test/file", 1000).await.unwrap();
        assert_eq!(loaded.chunks.len(), 2);
        assert_eq!(loaded.total_size, 1000);

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn mismatched_metadata_is_discarded() {
        let dir = std::env::temp_dir().join(format!("turbo_get_meta2_{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let sidecar = dir.join("out.bin.metadata");

        let chunks = ChunkInfo::plan(1000, 2, true);
        save(
            &sidecar,
            "http://example.test/file",
            "out.bin",
            1000,
            &chunks,
            Utc::now(),
            true,
            &[],
        )
        .await
        .unwrap();

        // different total_size => mismatch => discarded
        let loaded = load(&sidecar, "http://example.test/file", 2000).await;
        assert!(loaded.is_none());
        assert!(tokio::fs::metadata(&sidecar).await.is_err());

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn missing_sidecar_is_none() {
        let path = Path::new("/nonexistent/path/does.not.exist.metadata");
        assert!(load(path, "http://x", 1).await.is_none());
    }
}

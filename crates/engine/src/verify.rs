//! Post-transfer verification — `spec.md` §4.9.
//!
//! Grounded on `verify_download` in
//! `examples/original_source/turbo_get/engine.py`. Advisory only: no
//! trusted expected digest is available from this server contract, so a
//! checksum mismatch can never be detected and the destination is never
//! deleted on this path.

use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::io::AsyncReadExt;

const BLOCK_SIZE: usize = 64 * 1024;

pub enum VerifyOutcome {
    /// File present, size matches (or size is unknown), digest computed.
    /// `digest` is the first 16 hex characters of the SHA-256, as specified.
    Ok { digest: String },
    /// File is missing entirely.
    Missing,
    /// File exists but its size doesn't match the expected total.
    SizeMismatch { expected: u64, actual: u64 },
}

pub async fn verify(path: &Path, expected_total_size: u64) -> std::io::Result<VerifyOutcome> {
    let metadata = match tokio::fs::metadata(path).await {
        Ok(m) => m,
        Err(_) => return Ok(VerifyOutcome::Missing),
    };

    let actual_size = metadata.len();
    if expected_total_size > 0 && actual_size != expected_total_size {
        return Ok(VerifyOutcome::SizeMismatch {
            expected: expected_total_size,
            actual: actual_size,
        });
    }

    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; BLOCK_SIZE];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    let full_digest = format!("{:x}", hasher.finalize());
    let digest = full_digest[..16].to_string();

    Ok(VerifyOutcome::Ok { digest })
}

//! File preallocation — `spec.md` §4.3.

use std::path::Path;

/// Materializes the destination file at exactly `total_size` bytes if it
/// does not already exist. Existing files (resume case) are left intact.
pub(crate) async fn preallocate(path: &Path, total_size: u64) -> std::io::Result<()> {
    if total_size == 0 {
        return Ok(());
    }
    if tokio::fs::metadata(path).await.is_ok() {
        return Ok(());
    }
    let file = tokio::fs::File::create(path).await?;
    file.set_len(total_size).await
}

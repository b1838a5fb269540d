//! Error types for the download engine.
//!
//! `EngineError` is the only error ever returned from a public method, and
//! only at construction time (see `spec.md` §7 and `DESIGN.md`). Everything
//! that goes wrong during a transfer — a dropped connection, a 503, a
//! corrupt sidecar — is reported through the `status` callback and as a
//! `tracing` event, never as an `Err` out of `download()`.

use thiserror::Error;

/// Fatal, caller-visible errors. Only raised at construction time.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("url must not be empty")]
    EmptyUrl,

    #[error("num_threads must be at least 1")]
    ZeroWorkers,

    #[error("output path has no parent directory")]
    NoParentDirectory,
}

/// Internal, non-fatal transfer failures. Never leaves the crate's public
/// API; converted to a status message and a `tracing::warn!` wherever it
/// would otherwise propagate.
#[derive(Debug, Error)]
pub(crate) enum TransferError {
    #[error("network error: {0}")]
    Network(String),

    #[error("http error: {0}")]
    Http(u16),

    #[error("file error: {0}")]
    File(String),
}

impl From<reqwest::Error> for TransferError {
    fn from(e: reqwest::Error) -> Self {
        TransferError::Network(e.to_string())
    }
}

impl From<std::io::Error> for TransferError {
    fn from(e: std::io::Error) -> Self {
        TransferError::File(e.to_string())
    }
}

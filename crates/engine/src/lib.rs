//! TurboGet download engine.
//!
//! A single self-contained engine bound to one `(url, output_path)` pair:
//! capability probing, chunk planning, a concurrent worker pool with
//! retry/backoff, a resume-metadata sidecar, throughput accounting with an
//! optional rate cap, and post-transfer verification. See `DownloadEngine`
//! for the public surface.

mod callbacks;
mod capabilities;
mod chunk;
mod client;
mod engine;
mod error;
mod metadata;
mod monitor;
mod preallocate;
mod ratelimit;
mod verify;
mod worker;

pub use capabilities::ServerCapabilities;
pub use chunk::ChunkInfo;
pub use engine::DownloadEngine;
pub use error::EngineError;
pub use metadata::{sidecar_path, DownloadMetadata};
pub use verify::VerifyOutcome;

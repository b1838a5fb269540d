//! Callback type aliases shared across the engine.
//!
//! Per `spec.md` §4.10/§9: three typed subscription slots, at most one
//! function per slot, invoked on the engine's own execution context. None
//! may block; a caller that needs to touch UI state marshals to its own
//! thread.

use std::sync::Arc;

pub type ProgressCallback = Arc<dyn Fn(u64, u64) + Send + Sync>;
pub type SpeedCallback = Arc<dyn Fn(f64, f64) + Send + Sync>;
pub type StatusCallback = Arc<dyn Fn(String) + Send + Sync>;

//! Capability probing — the initial HEAD that determines whether a server
//! supports byte ranges and how large the resource is.
//!
//! Grounded on `supports_ranges`/`get_file_info` in the teacher's
//! `crates/engine/src/chunked.rs`, merged into a single probe call and
//! generalized to fall back to safe defaults on any failure, per `spec.md`
//! §4.1.

use reqwest::Client;

/// Capabilities detected from the server's response to the probe request.
/// Immutable for the remainder of the download once derived.
#[derive(Debug, Clone, Default)]
pub struct ServerCapabilities {
    pub supports_range: bool,
    pub supports_resume: bool,
    pub content_encoding: Option<String>,
}

/// Outcome of a capability probe: the derived capabilities and the total
/// resource size (0 if unknown).
pub struct ProbeResult {
    pub capabilities: ServerCapabilities,
    pub total_size: u64,
}

/// Issues a HEAD with `Range: bytes=0-0`, following redirects, and derives
/// capabilities from the response headers. Never returns `Err` to the
/// caller in a way that should abort the download — any failure is folded
/// into the fallback capabilities `spec.md` §4.1 prescribes.
pub async fn probe(client: &Client, url: &str) -> ProbeResult {
    match try_probe(client, url).await {
        Ok(result) => result,
        Err(e) => {
            tracing::warn!(error = %e, "capability probe failed, falling back to single-stream defaults");
            ProbeResult {
                capabilities: ServerCapabilities::default(),
                total_size: 0,
            }
        }
    }
}

async fn try_probe(client: &Client, url: &str) -> Result<ProbeResult, reqwest::Error> {
    let response = client
        .head(url)
        .header("Range", "bytes=0-0")
        .send()
        .await?;

    let headers = response.headers();

    let accept_ranges = headers
        .get("accept-ranges")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_ascii_lowercase());
    let supports_range = matches!(accept_ranges.as_deref(), Some(v) if v != "none");

    let content_encoding = headers
        .get("content-encoding")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    let total_size = if let Some(content_range) = headers
        .get("content-range")
        .and_then(|v| v.to_str().ok())
    {
        content_range
            .rsplit('/')
            .next()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(0)
    } else {
        response.content_length().unwrap_or(0)
    };

    Ok(ProbeResult {
        capabilities: ServerCapabilities {
            supports_range,
            // Accept-Ranges present at all (even a value other than
            // "bytes") implies the server tracks ranges well enough to
            // resume from; `spec.md` §4.1 only formally requires this for
            // `supports_range` but the original engine derives both from
            // the same header presence check.
            supports_resume: accept_ranges.is_some(),
            content_encoding,
        },
        total_size,
    })
}

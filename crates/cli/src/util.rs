//! Small formatting/validation helpers with no engine dependency.
//!
//! Grounded on `format_bytes`/`is_valid_url`/`get_default_filename` in
//! `examples/original_source/turbo_get/utils.py`. The original GUI is out of
//! scope; these three are still useful to any front end and are kept here,
//! in the CLI crate rather than the engine, since the engine never needs
//! them.

/// Renders a byte count as `"12.34 MB"`-style output, matching the
/// original's `format_bytes` power-of-1024 scaling.
pub fn format_bytes(size: f64) -> String {
    const UNITS: [&str; 5] = ["", "K", "M", "G", "T"];
    let mut size = size;
    let mut unit = 0;
    while size > 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{:.2} {}B", size, UNITS[unit])
}

/// Basic URL sanity check: must parse and carry both a scheme and a host.
pub fn is_valid_url(url: &str) -> bool {
    match url::Url::parse(url) {
        Ok(parsed) => parsed.host_str().is_some(),
        Err(_) => false,
    }
}

/// Derives a default destination filename from the URL's path, falling back
/// to `download.dat` when the path is empty or the URL has no usable last
/// segment.
pub fn get_default_filename(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|parsed| {
            parsed
                .path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "download.dat".to_string())
}

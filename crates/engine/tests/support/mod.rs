//! A minimal in-process HTTP/1.1 server for exercising the engine's
//! capability probe, ranged GET, and retry paths without reaching the
//! network. Each response closes its connection, which keeps the parsing
//! trivial and is valid HTTP/1.1.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// A one-shot scripted response for a specific `Range` header value (or
/// `None` for a request with no `Range` header at all). Consumed the first
/// time a matching request arrives; subsequent requests for the same range
/// fall through to normal serving.
#[derive(Clone)]
pub enum Script {
    /// Respond with this status code and an empty body.
    Status(u16),
}

pub struct TestServer {
    pub port: u16,
    payload: Arc<Vec<u8>>,
    supports_ranges: bool,
    scripts: Arc<Mutex<std::collections::HashMap<Option<String>, VecDeque<Script>>>>,
    pub requests: Arc<Mutex<Vec<String>>>,
    handle: JoinHandle<()>,
}

impl TestServer {
    /// Starts a server serving `payload` with `Accept-Ranges: bytes` (or
    /// not, depending on `supports_ranges`).
    pub async fn start(payload: Vec<u8>, supports_ranges: bool) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let payload = Arc::new(payload);
        let scripts: Arc<Mutex<std::collections::HashMap<Option<String>, VecDeque<Script>>>> =
            Arc::new(Mutex::new(std::collections::HashMap::new()));
        let requests = Arc::new(Mutex::new(Vec::new()));

        let payload_clone = payload.clone();
        let scripts_clone = scripts.clone();
        let requests_clone = requests.clone();

        let handle = tokio::spawn(async move {
            loop {
                let (socket, _) = match listener.accept().await {
                    Ok(pair) => pair,
                    Err(_) => return,
                };
                let payload = payload_clone.clone();
                let scripts = scripts_clone.clone();
                let requests = requests_clone.clone();
                tokio::spawn(async move {
                    let _ = serve_one(socket, payload, supports_ranges, scripts, requests).await;
                });
            }
        });

        Self {
            port,
            payload,
            supports_ranges,
            scripts,
            requests,
            handle,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{}", self.port, path)
    }

    /// Queues a one-shot scripted response for the next request whose
    /// `Range` header equals `range` (e.g. `Some("bytes=0-249999")`).
    pub fn script(&self, range: Option<&str>, response: Script) {
        self.scripts
            .lock()
            .unwrap()
            .entry(range.map(|s| s.to_string()))
            .or_default()
            .push_back(response);
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn stop(&self) {
        self.handle.abort();
    }
}

async fn serve_one(
    mut socket: tokio::net::TcpStream,
    payload: Arc<Vec<u8>>,
    supports_ranges: bool,
    scripts: Arc<Mutex<std::collections::HashMap<Option<String>, VecDeque<Script>>>>,
    requests: Arc<Mutex<Vec<String>>>,
) -> std::io::Result<()> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..n]);
        if buf.windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
    }

    let text = String::from_utf8_lossy(&buf);
    let mut lines = text.lines();
    let request_line = lines.next().unwrap_or("");
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or("GET").to_string();

    let mut range_header: Option<String> = None;
    for line in lines {
        if let Some(idx) = line.find(':') {
            let (key, value) = line.split_at(idx);
            if key.eq_ignore_ascii_case("range") {
                range_header = Some(value[1..].trim().to_string());
            }
        }
    }

    requests
        .lock()
        .unwrap()
        .push(range_header.clone().unwrap_or_else(|| "<none>".into()));

    let scripted = {
        let mut guard = scripts.lock().unwrap();
        guard
            .get_mut(&range_header)
            .and_then(|queue| queue.pop_front())
    };

    if let Some(Script::Status(code)) = scripted {
        let response = format!(
            "HTTP/1.1 {} {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
            code,
            reason(code)
        );
        socket.write_all(response.as_bytes()).await?;
        return Ok(());
    }

    if method == "HEAD" {
        let mut headers = format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n",
            payload.len()
        );
        if supports_ranges {
            headers.push_str("Accept-Ranges: bytes\r\n");
        }
        headers.push_str("\r\n");
        socket.write_all(headers.as_bytes()).await?;
        return Ok(());
    }

    // GET
    if supports_ranges {
        if let Some(range) = &range_header {
            if let Some((start, end)) = parse_range(range, payload.len()) {
                let body = &payload[start..=end];
                let headers = format!(
                    "HTTP/1.1 206 Partial Content\r\nContent-Range: bytes {}-{}/{}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    start, end, payload.len(), body.len()
                );
                socket.write_all(headers.as_bytes()).await?;
                socket.write_all(body).await?;
                return Ok(());
            }
        }
    }

    let headers = format!(
        "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        payload.len()
    );
    socket.write_all(headers.as_bytes()).await?;
    socket.write_all(&payload).await?;
    Ok(())
}

fn parse_range(range: &str, total: usize) -> Option<(usize, usize)> {
    let spec = range.strip_prefix("bytes=")?;
    let (start_str, end_str) = spec.split_once('-')?;
    let start: usize = start_str.parse().ok()?;
    let end: usize = if end_str.is_empty() {
        total.saturating_sub(1)
    } else {
        end_str.parse().ok()?
    };
    if start > end || end >= total {
        return None;
    }
    Some((start, end))
}

fn reason(code: u16) -> &'static str {
    match code {
        200 => "OK",
        206 => "Partial Content",
        404 => "Not Found",
        503 => "Service Unavailable",
        _ => "Error",
    }
}

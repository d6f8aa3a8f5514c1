//! Minimal HTTP/1.1 server for integration tests.
//!
//! Serves one static body on every path. Range GETs get 206 Partial Content
//! unless ranges are switched off; a number of range responses can be cut
//! short to exercise retries.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct RangeServerOptions {
    /// If false, GET ignores Range and always returns 200 with the full body.
    pub support_ranges: bool,
    /// If true, 200 responses carry no Content-Length; the body ends at close.
    pub hide_length: bool,
    /// Sent as `Content-Disposition` when set.
    pub content_disposition: Option<&'static str>,
    /// Path appended to the base URL returned by `start_with_options`.
    pub path: &'static str,
    /// The first this-many range responses (other than the probe) stop
    /// halfway through the body.
    pub truncate_first: usize,
    /// When set, every GET is answered with this status line (e.g.
    /// "404 Not Found") and a small HTML error body.
    pub error_status: Option<&'static str>,
}

impl Default for RangeServerOptions {
    fn default() -> Self {
        Self {
            support_ranges: true,
            hide_length: false,
            content_disposition: None,
            path: "/data.bin",
            truncate_first: 0,
            error_status: None,
        }
    }
}

/// Starts a server in a background thread serving `body`. Returns the URL
/// of the file (e.g. "http://127.0.0.1:12345/data.bin").
pub fn start(body: Vec<u8>) -> String {
    start_with_options(body, RangeServerOptions::default())
}

pub fn start_with_options(body: Vec<u8>, opts: RangeServerOptions) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let body = Arc::new(body);
    let truncated = Arc::new(AtomicUsize::new(0));
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let body = Arc::clone(&body);
            let truncated = Arc::clone(&truncated);
            thread::spawn(move || handle(stream, &body, opts, &truncated));
        }
    });
    format!("http://127.0.0.1:{}{}", port, opts.path)
}

fn handle(mut stream: TcpStream, body: &[u8], opts: RangeServerOptions, truncated: &AtomicUsize) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(2)));
    let mut buf = [0u8; 8192];
    let n = match stream.read(&mut buf) {
        Ok(0) | Err(_) => return,
        Ok(n) => n,
    };
    let Ok(request) = std::str::from_utf8(&buf[..n]) else {
        return;
    };
    let (method, range) = parse_request(request);
    if !method.eq_ignore_ascii_case("GET") {
        let _ = stream.write_all(b"HTTP/1.1 405 Method Not Allowed\r\nConnection: close\r\n\r\n");
        return;
    }

    if let Some(status) = opts.error_status {
        let page = b"<html><body>no such file</body></html>";
        let response = format!(
            "HTTP/1.1 {}\r\nConnection: close\r\nContent-Type: text/html\r\nContent-Length: {}\r\n\r\n",
            status,
            page.len()
        );
        let _ = stream.write_all(response.as_bytes());
        let _ = stream.write_all(page);
        return;
    }

    let total = body.len() as u64;
    let mut headers = String::from("Connection: close\r\n");
    if let Some(cd) = opts.content_disposition {
        headers.push_str(&format!("Content-Disposition: {}\r\n", cd));
    }

    let ranged = range.filter(|_| opts.support_ranges);
    let (status, mut slice) = match ranged {
        Some((start, end_incl)) => {
            let end_incl = end_incl.min(total.saturating_sub(1));
            if start > end_incl {
                let response = format!(
                    "HTTP/1.1 416 Range Not Satisfiable\r\nContent-Range: bytes */{}\r\n{}Content-Length: 0\r\n\r\n",
                    total, headers
                );
                let _ = stream.write_all(response.as_bytes());
                return;
            }
            let slice = &body[start as usize..=end_incl as usize];
            headers.push_str(&format!(
                "Content-Range: bytes {}-{}/{}\r\nContent-Length: {}\r\n",
                start,
                end_incl,
                total,
                slice.len()
            ));
            ("206 Partial Content", slice)
        }
        None => {
            if !opts.hide_length {
                headers.push_str(&format!("Content-Length: {}\r\n", total));
            }
            ("200 OK", body)
        }
    };

    // the probe asks for an open-ended range; never cut that one
    let is_probe = matches!(range, Some((_, u64::MAX)));
    if ranged.is_some() && !is_probe && truncated.fetch_add(1, Ordering::SeqCst) < opts.truncate_first {
        slice = &slice[..slice.len() / 2];
    }

    let response = format!("HTTP/1.1 {}\r\n{}\r\n", status, headers);
    let _ = stream.write_all(response.as_bytes());
    let _ = stream.write_all(slice);
}

/// Returns (method, optional (start, end_inclusive) for `Range: bytes=X-Y`).
/// An open-ended range has `u64::MAX` as its end.
fn parse_request(request: &str) -> (&str, Option<(u64, u64)>) {
    let mut lines = request.lines();
    let method = lines
        .next()
        .and_then(|l| l.split_whitespace().next())
        .unwrap_or("");
    let mut range = None;
    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            break;
        }
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        if !name.trim().eq_ignore_ascii_case("range") {
            continue;
        }
        let Some(spec) = value.trim().strip_prefix("bytes=") else {
            continue;
        };
        if let Some((a, b)) = spec.split_once('-') {
            let start = a.trim().parse::<u64>().unwrap_or(0);
            let end = b.trim();
            let end_incl = if end.is_empty() {
                u64::MAX
            } else {
                end.parse::<u64>().unwrap_or(0)
            };
            range = Some((start, end_incl));
        }
    }
    (method, range)
}

//! Resource probing.
//!
//! Issues `GET` with `Range: bytes=0-` and hangs up as soon as the headers are
//! in. A 206 answer means the server honours ranges; the complete length comes
//! from `Content-Range`, else from `Content-Length`.

mod parse;

use anyhow::{Context, Result};
use curl::easy::{Easy, List};
use std::str;

use crate::filename::derive_filename;
use crate::transport::{CurlOptions, Endpoint};

const PROBE_ATTEMPTS: usize = 3;

/// What the downloader needs to know before planning chunks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    /// URL after redirects; all range requests go here.
    pub resolved_url: String,
    pub filename: String,
    /// 0 when the server never reported a length.
    pub total_length: u64,
    pub supports_range: bool,
}

/// Probes `endpoint`, retrying up to three times while no length is reported.
///
/// Blocking; call from `spawn_blocking` in async code.
pub fn probe(endpoint: &Endpoint, opts: &CurlOptions) -> Result<ProbeResult> {
    let mut result = probe_once(endpoint, opts)?;
    for attempt in 2..=PROBE_ATTEMPTS {
        if result.total_length > 0 {
            break;
        }
        tracing::debug!(attempt, url = %endpoint.url, "probe reported no length, retrying");
        result = probe_once(endpoint, opts)?;
    }
    Ok(result)
}

fn probe_once(endpoint: &Endpoint, opts: &CurlOptions) -> Result<ProbeResult> {
    let mut lines: Vec<String> = Vec::new();

    let mut easy = Easy::new();
    easy.url(&endpoint.url).context("invalid URL")?;
    easy.follow_location(true)?;
    easy.max_redirections(10)?;
    easy.connect_timeout(opts.connect_timeout)?;
    easy.range("0-")?;
    if let Some(proxy) = endpoint.proxy.as_deref() {
        easy.proxy(proxy)?;
    }
    if !endpoint.headers.is_empty() {
        let mut list = List::new();
        for (k, v) in &endpoint.headers {
            list.append(&format!("{}: {}", k.trim(), v.trim()))?;
        }
        easy.http_headers(list)?;
    }

    let performed = {
        let mut transfer = easy.transfer();
        transfer.header_function(|data| {
            if let Ok(s) = str::from_utf8(data) {
                let line = s.trim_end();
                // a new status line starts the next response in a redirect chain
                if line.starts_with("HTTP/") {
                    lines.clear();
                }
                lines.push(line.to_string());
            }
            true
        })?;
        // refusing the first body bytes ends the transfer
        transfer.write_function(|_| Ok(0))?;
        transfer.perform()
    };
    match performed {
        Ok(()) => {}
        Err(e) if e.is_write_error() => {}
        Err(e) => return Err(e).with_context(|| format!("probe of {} failed", endpoint.url)),
    }

    let status = easy.response_code().context("no response code")?;
    if status >= 400 {
        anyhow::bail!("{} returned HTTP {}", endpoint.url, status);
    }
    let resolved_url = easy
        .effective_url()?
        .map(str::to_string)
        .unwrap_or_else(|| endpoint.url.clone());

    let head = parse::parse_head(&lines);
    let result = ProbeResult {
        filename: derive_filename(&endpoint.url, head.content_disposition.as_deref()),
        total_length: head.total_length(),
        supports_range: status == 206,
        resolved_url,
    };
    tracing::debug!(
        status,
        total_length = result.total_length,
        supports_range = result.supports_range,
        resolved = %result.resolved_url,
        "probed resource"
    );
    Ok(result)
}

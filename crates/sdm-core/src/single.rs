//! Single-stream fallback for servers that ignore ranges or hide the length.
//!
//! One plain GET; the body is written sequentially from offset 0 and the file
//! is cut to the number of bytes received.

use anyhow::{Context, Result};
use curl::easy::{Easy, List};
use std::cell::Cell;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::progress::ProgressStats;
use crate::storage::StorageWriter;
use crate::transport::{parse_status_line, CurlOptions, Endpoint};

/// Downloads `endpoint` with one GET into `storage`. `expected_len` is only
/// used for progress totals; 0 means unknown. Returns bytes written.
///
/// Blocking; run it on `spawn_blocking`. `cancel` aborts the transfer.
pub fn download_single(
    endpoint: &Endpoint,
    storage: &StorageWriter,
    expected_len: u64,
    opts: &CurlOptions,
    progress_tx: Option<&mpsc::UnboundedSender<ProgressStats>>,
    cancel: &CancellationToken,
) -> Result<u64> {
    let started = Instant::now();
    let report = |bytes_done: u64| {
        if let Some(tx) = progress_tx {
            let _ = tx.send(ProgressStats {
                bytes_done,
                total_bytes: expected_len,
                elapsed_secs: started.elapsed().as_secs_f64(),
                chunks_done: 0,
                chunk_count: 0,
            });
        }
    };

    let mut easy = Easy::new();
    easy.url(&endpoint.url).context("invalid URL")?;
    easy.follow_location(true)?;
    easy.max_redirections(10)?;
    easy.connect_timeout(opts.connect_timeout)?;
    easy.low_speed_limit(opts.low_speed_limit)?;
    easy.low_speed_time(opts.low_speed_time)?;
    easy.progress(true)?;
    if let Some(sz) = opts.buffer_size {
        easy.buffer_size(sz)?;
    }
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

    report(0);
    let status: Cell<Option<u32>> = Cell::new(None);
    let mut written = 0u64;
    let mut write_error = None;
    let performed = {
        let mut transfer = easy.transfer();
        transfer.header_function(|data| {
            if let Ok(line) = std::str::from_utf8(data) {
                // a redirect chain has one status line per hop
                if line.starts_with("HTTP/") {
                    status.set(parse_status_line(line));
                }
            }
            true
        })?;
        transfer.write_function(|data| {
            // error pages must not reach the destination file
            if !status.get().map_or(false, is_success) {
                return Ok(0);
            }
            match storage.write_at(written, data) {
                Ok(()) => {
                    written += data.len() as u64;
                    report(written);
                    Ok(data.len())
                }
                Err(e) => {
                    write_error = Some(e);
                    Ok(0)
                }
            }
        })?;
        transfer.progress_function(|_, _, _, _| !cancel.is_cancelled())?;
        transfer.perform()
    };

    if cancel.is_cancelled() {
        anyhow::bail!("download cancelled");
    }
    if let Some(e) = write_error {
        return Err(e.context("single-stream write failed"));
    }
    let code = match status.get() {
        Some(code) => code,
        None => easy.response_code().context("no response code")?,
    };
    if !is_success(code) {
        anyhow::bail!("GET {} returned HTTP {}", endpoint.url, code);
    }
    performed.with_context(|| format!("GET {} failed", endpoint.url))?;

    storage.set_len(written)?;
    tracing::debug!(written, "single-stream download finished");
    Ok(written)
}

fn is_success(code: u32) -> bool {
    (200..300).contains(&code)
}

//! End-to-end download: probe, plan, then either the work-stealing scheduler
//! or the single-stream fallback.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::chunk::{plan_chunks, select_span, span_len};
use crate::config::SdmConfig;
use crate::fetch::RangeFetcher;
use crate::probe::{self, ProbeResult};
use crate::progress::ProgressStats;
use crate::retry::RetryPolicy;
use crate::scheduler::{self, RunSummary, SchedulerError};
use crate::single;
use crate::sink::FileSink;
use crate::storage::StorageWriter;
use crate::transport::{CurlOptions, Endpoint, RangeTransport};

/// One download job.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub url: String,
    pub headers: HashMap<String, String>,
    pub proxy: Option<String>,
    /// Destination directory; created if missing.
    pub dir: PathBuf,
    /// Overrides the name derived from the server response.
    pub filename: Option<String>,
    pub threads: usize,
    pub chunk_size: u64,
    /// First chunk index to fetch.
    pub start_chunk: usize,
    /// Last chunk index to fetch (inclusive); `None` means through the end.
    pub end_chunk: Option<usize>,
    pub retry: RetryPolicy,
    pub write_retry_delay: Duration,
    pub curl: CurlOptions,
}

impl DownloadRequest {
    /// Request for `url` into `dir` with everything else taken from `cfg`.
    pub fn from_config(url: impl Into<String>, dir: impl Into<PathBuf>, cfg: &SdmConfig) -> Self {
        Self {
            url: url.into(),
            headers: HashMap::new(),
            proxy: cfg.proxy.clone(),
            dir: dir.into(),
            filename: None,
            threads: cfg.threads,
            chunk_size: cfg.chunk_size,
            start_chunk: 0,
            end_chunk: None,
            retry: cfg.retry_policy(),
            write_retry_delay: cfg.write_retry_delay(),
            curl: cfg.curl_options(),
        }
    }

    fn endpoint(&self, url: &str) -> Endpoint {
        Endpoint {
            headers: self.headers.clone(),
            proxy: self.proxy.clone(),
            ..Endpoint::new(url)
        }
    }
}

#[derive(Debug, Clone)]
pub struct DownloadOutcome {
    pub path: PathBuf,
    /// Complete resource length as reported by the server (0 if unknown).
    pub total_length: u64,
    pub bytes_written: u64,
    /// False when the single-stream fallback was used.
    pub multi_threaded: bool,
    /// Scheduler statistics for a segmented download.
    pub summary: Option<RunSummary>,
}

/// Runs `request` to completion using `transport` for range requests.
///
/// Progress snapshots go to `progress` if given. Firing `shutdown` stops all
/// requests and fails the download; bytes already written stay on disk.
pub async fn download(
    request: &DownloadRequest,
    transport: Arc<dyn RangeTransport>,
    progress: Option<mpsc::UnboundedSender<ProgressStats>>,
    shutdown: CancellationToken,
) -> Result<DownloadOutcome> {
    if request.chunk_size == 0 {
        anyhow::bail!("chunk size must be greater than zero");
    }
    if request.threads == 0 {
        return Err(SchedulerError::InvalidThreads(request.threads).into());
    }

    let probed: ProbeResult = tokio::task::spawn_blocking({
        let endpoint = request.endpoint(&request.url);
        let opts = request.curl;
        move || probe::probe(&endpoint, &opts)
    })
    .await
    .context("probe task join")??;

    let filename = request.filename.clone().unwrap_or_else(|| probed.filename.clone());
    tokio::fs::create_dir_all(&request.dir)
        .await
        .with_context(|| format!("create directory {}", request.dir.display()))?;
    let path = request.dir.join(&filename);
    let storage = StorageWriter::open(&path)?;
    let endpoint = request.endpoint(&probed.resolved_url);

    let segmented = probed.supports_range && probed.total_length > 0;
    tracing::info!(
        url = %probed.resolved_url,
        path = %path.display(),
        total_length = probed.total_length,
        threads = if segmented { request.threads } else { 1 },
        segmented,
        "starting download"
    );

    if !segmented {
        let written = tokio::task::spawn_blocking({
            let storage = storage.clone();
            let opts = request.curl;
            let total = probed.total_length;
            let shutdown = shutdown.clone();
            move || {
                single::download_single(&endpoint, &storage, total, &opts, progress.as_ref(), &shutdown)
            }
        })
        .await
        .context("single-stream task join")??;
        storage.sync()?;
        return Ok(DownloadOutcome {
            path,
            total_length: probed.total_length,
            bytes_written: written,
            multi_threaded: false,
            summary: None,
        });
    }

    let all = plan_chunks(probed.total_length, request.chunk_size);
    let chunks = select_span(&all, request.start_chunk, request.end_chunk);
    let span_bytes = span_len(&chunks);
    storage.ensure_len(probed.total_length)?;

    let sink = FileSink::new(
        storage.clone(),
        chunks.len(),
        span_bytes,
        request.write_retry_delay,
        progress,
    );
    let fetcher = RangeFetcher::new(transport, endpoint).with_total_length(probed.total_length);
    let summary = scheduler::run(
        request.threads,
        &chunks,
        &fetcher,
        &sink,
        &request.retry,
        &shutdown,
    )
    .await?;
    storage.sync()?;

    tracing::info!(
        path = %path.display(),
        bytes = sink.bytes_done(),
        chunks = sink.chunks_done(),
        retries = summary.retries,
        steals = summary.steals,
        "download complete"
    );
    Ok(DownloadOutcome {
        path,
        total_length: probed.total_length,
        bytes_written: sink.bytes_done(),
        multi_threaded: true,
        summary: Some(summary),
    })
}

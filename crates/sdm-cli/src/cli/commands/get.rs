//! `sdm get`: download one URL with the work-stealing scheduler.

use anyhow::{Context, Result};
use sdm_core::checksum;
use sdm_core::config::SdmConfig;
use sdm_core::transport::CurlTransport;
use sdm_core::{download, DownloadRequest, ProgressStats};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::cli::GetArgs;

const PROGRESS_INTERVAL_MS: u128 = 500;

pub async fn run_get(args: &GetArgs, cfg: &SdmConfig) -> Result<()> {
    let request = build_request(args, cfg)?;

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("interrupted");
                shutdown.cancel();
            }
        }
    });

    let (progress_tx, progress_rx) = mpsc::unbounded_channel::<ProgressStats>();
    let printer = tokio::spawn(print_progress(progress_rx));

    let transport = Arc::new(CurlTransport::new(request.curl));
    let result = download(&request, transport, Some(progress_tx), shutdown).await;
    let _ = printer.await;
    let outcome = result?;

    if let Some(expected) = args.sha256.clone() {
        let path = outcome.path.clone();
        tokio::task::spawn_blocking(move || checksum::verify_sha256(&path, &expected))
            .await
            .context("checksum task join")??;
        println!("sha256 OK");
    }

    match &outcome.summary {
        Some(s) => println!(
            "saved {} ({} bytes, {} chunks, {} retries, {} steals)",
            outcome.path.display(),
            outcome.bytes_written,
            s.chunks,
            s.retries,
            s.steals
        ),
        None => println!(
            "saved {} ({} bytes, single stream)",
            outcome.path.display(),
            outcome.bytes_written
        ),
    }
    Ok(())
}

/// Merges CLI flags over the config file.
pub(crate) fn build_request(args: &GetArgs, cfg: &SdmConfig) -> Result<DownloadRequest> {
    let mut request = DownloadRequest::from_config(&args.url, &args.dir, cfg);
    if let Some(threads) = args.threads {
        request.threads = threads;
    }
    if let Some(chunk_size) = args.chunk_size {
        request.chunk_size = chunk_size;
    }
    if args.max_retries.is_some() {
        request.retry.max_retries = args.max_retries;
    }
    if args.proxy.is_some() {
        request.proxy = args.proxy.clone();
    }
    if let Some(json) = args.headers.as_deref() {
        request.headers = parse_headers(json)?;
    }
    request.filename = args.filename.clone();
    request.start_chunk = args.start_chunk;
    request.end_chunk = args.end_chunk;
    Ok(request)
}

/// Parses `--headers`: a JSON object of string values.
pub(crate) fn parse_headers(json: &str) -> Result<HashMap<String, String>> {
    serde_json::from_str(json).context("--headers must be a JSON object of strings")
}

async fn print_progress(mut rx: mpsc::UnboundedReceiver<ProgressStats>) {
    let mut last_print: Option<Instant> = None;
    let mut printed = false;
    while let Some(stats) = rx.recv().await {
        let due = last_print.map_or(true, |t| t.elapsed().as_millis() >= PROGRESS_INTERVAL_MS);
        let finished = stats.total_bytes > 0 && stats.bytes_done >= stats.total_bytes;
        if !due && !finished {
            continue;
        }
        let done_mib = stats.bytes_done as f64 / 1_048_576.0;
        let rate_mib = stats.bytes_per_sec() / 1_048_576.0;
        if stats.total_bytes > 0 {
            let eta = stats
                .eta_secs()
                .map(|s| format!("{:.0}s", s))
                .unwrap_or_else(|| "?".to_string());
            eprint!(
                "\r  {:.1} / {:.1} MiB ({:.1}%)  {:.2} MiB/s  ETA {}  ",
                done_mib,
                stats.total_bytes as f64 / 1_048_576.0,
                stats.fraction() * 100.0,
                rate_mib,
                eta
            );
        } else {
            eprint!("\r  {:.1} MiB  {:.2} MiB/s  ", done_mib, rate_mib);
        }
        printed = true;
        last_print = Some(Instant::now());
    }
    if printed {
        eprintln!();
    }
}

//! Integration tests: end-to-end downloads against a local HTTP server.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::range_server::{self, RangeServerOptions};
use sdm_core::checksum::sha256_path;
use sdm_core::config::SdmConfig;
use sdm_core::retry::RetryPolicy;
use sdm_core::single::download_single;
use sdm_core::storage::StorageWriter;
use sdm_core::transport::{CurlOptions, CurlTransport, Endpoint};
use sdm_core::{download, DownloadRequest, ProgressStats, SchedulerError};
use sha2::{Digest, Sha256};
use tempfile::tempdir;
use tokio_util::sync::CancellationToken;

fn body(len: usize) -> Vec<u8> {
    (0u32..).map(|i| (i * 31 % 251) as u8).take(len).collect()
}

fn request(url: &str, dir: &std::path::Path, threads: usize, chunk_size: u64) -> DownloadRequest {
    let mut req = DownloadRequest::from_config(url, dir, &SdmConfig::default());
    req.threads = threads;
    req.chunk_size = chunk_size;
    req.retry = RetryPolicy::immediate(Some(5));
    req.write_retry_delay = Duration::from_millis(10);
    req
}

fn transport() -> Arc<CurlTransport> {
    Arc::new(CurlTransport::new(CurlOptions::default()))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn segmented_download_matches_body() {
    let data = body(300 * 1024);
    let url = range_server::start(data.clone());
    let dir = tempdir().unwrap();

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<ProgressStats>();
    let outcome = download(
        &request(&url, dir.path(), 4, 16 * 1024),
        transport(),
        Some(tx),
        CancellationToken::new(),
    )
    .await
    .expect("download");

    assert!(outcome.multi_threaded);
    assert_eq!(outcome.path, dir.path().join("data.bin"));
    assert_eq!(outcome.total_length, data.len() as u64);
    assert_eq!(outcome.bytes_written, data.len() as u64);
    assert_eq!(outcome.summary.as_ref().map(|s| s.chunks), Some(19));

    let written = std::fs::read(&outcome.path).unwrap();
    assert_eq!(written, data);
    assert_eq!(
        sha256_path(&outcome.path).unwrap(),
        hex::encode(Sha256::digest(&data))
    );

    let mut snapshots = Vec::new();
    while let Ok(s) = rx.try_recv() {
        snapshots.push(s);
    }
    assert_eq!(snapshots.len(), 1 + 19, "one at start plus one per chunk");
    assert_eq!(snapshots[0].bytes_done, 0);
    let last = snapshots.last().unwrap();
    assert_eq!(last.bytes_done, data.len() as u64);
    assert_eq!(last.chunks_done, 19);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn more_threads_than_chunks() {
    let data = body(10 * 1000 + 7);
    let url = range_server::start(data.clone());
    let dir = tempdir().unwrap();
    let outcome = download(
        &request(&url, dir.path(), 64, 1000),
        transport(),
        None,
        CancellationToken::new(),
    )
    .await
    .unwrap();
    assert_eq!(std::fs::read(&outcome.path).unwrap(), data);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn truncated_responses_are_retried() {
    let data = body(64 * 1024);
    let url = range_server::start_with_options(
        data.clone(),
        RangeServerOptions {
            truncate_first: 3,
            ..RangeServerOptions::default()
        },
    );
    let dir = tempdir().unwrap();
    let outcome = download(
        &request(&url, dir.path(), 2, 8 * 1024),
        transport(),
        None,
        CancellationToken::new(),
    )
    .await
    .unwrap();
    assert_eq!(std::fs::read(&outcome.path).unwrap(), data);
    assert!(outcome.summary.unwrap().retries >= 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn chunk_window_writes_only_its_bytes() {
    let data = body(10 * 1024);
    let url = range_server::start(data.clone());
    let dir = tempdir().unwrap();

    let mut req = request(&url, dir.path(), 3, 1024);
    req.start_chunk = 2;
    req.end_chunk = Some(4);
    let outcome = download(&req, transport(), None, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.bytes_written, 3 * 1024);
    let written = std::fs::read(&outcome.path).unwrap();
    assert_eq!(written.len(), data.len(), "file grown to full length");
    assert_eq!(&written[2048..5120], &data[2048..5120]);
    assert!(written[..2048].iter().all(|b| *b == 0));
    assert!(written[5120..].iter().all(|b| *b == 0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn resume_keeps_earlier_chunks() {
    let data = body(8 * 1024);
    let url = range_server::start(data.clone());
    let dir = tempdir().unwrap();

    let mut first = request(&url, dir.path(), 2, 1024);
    first.end_chunk = Some(3);
    download(&first, transport(), None, CancellationToken::new())
        .await
        .unwrap();

    let mut rest = request(&url, dir.path(), 2, 1024);
    rest.start_chunk = 4;
    let outcome = download(&rest, transport(), None, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(std::fs::read(&outcome.path).unwrap(), data);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn server_without_ranges_falls_back_to_single_stream() {
    let data = body(50 * 1024);
    let url = range_server::start_with_options(
        data.clone(),
        RangeServerOptions {
            support_ranges: false,
            ..RangeServerOptions::default()
        },
    );
    let dir = tempdir().unwrap();
    let outcome = download(
        &request(&url, dir.path(), 8, 4096),
        transport(),
        None,
        CancellationToken::new(),
    )
    .await
    .unwrap();
    assert!(!outcome.multi_threaded);
    assert!(outcome.summary.is_none());
    assert_eq!(outcome.bytes_written, data.len() as u64);
    assert_eq!(std::fs::read(&outcome.path).unwrap(), data);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unknown_length_falls_back_and_replaces_stale_file() {
    let data = body(20 * 1024);
    let url = range_server::start_with_options(
        data.clone(),
        RangeServerOptions {
            support_ranges: false,
            hide_length: true,
            ..RangeServerOptions::default()
        },
    );
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("data.bin"), vec![0xAAu8; 64 * 1024]).unwrap();

    let outcome = download(
        &request(&url, dir.path(), 4, 4096),
        transport(),
        None,
        CancellationToken::new(),
    )
    .await
    .unwrap();
    assert!(!outcome.multi_threaded);
    assert_eq!(outcome.total_length, 0);
    assert_eq!(std::fs::read(&outcome.path).unwrap(), data);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn filename_comes_from_disposition_or_decoded_path() {
    let data = body(4096);
    let dir = tempdir().unwrap();

    let url = range_server::start_with_options(
        data.clone(),
        RangeServerOptions {
            path: "/files/annual%20report.pdf",
            ..RangeServerOptions::default()
        },
    );
    let outcome = download(
        &request(&url, dir.path(), 2, 1024),
        transport(),
        None,
        CancellationToken::new(),
    )
    .await
    .unwrap();
    assert_eq!(outcome.path, dir.path().join("annual report.pdf"));

    let url = range_server::start_with_options(
        data.clone(),
        RangeServerOptions {
            content_disposition: Some("attachment; filename=\"served.iso\""),
            ..RangeServerOptions::default()
        },
    );
    let outcome = download(
        &request(&url, dir.path(), 2, 1024),
        transport(),
        None,
        CancellationToken::new(),
    )
    .await
    .unwrap();
    assert_eq!(outcome.path, dir.path().join("served.iso"));

    let mut req = request(&url, dir.path().join("nested").as_path(), 2, 1024);
    req.filename = Some("chosen.bin".into());
    let outcome = download(&req, transport(), None, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(outcome.path, dir.path().join("nested").join("chosen.bin"));
    assert_eq!(std::fs::read(&outcome.path).unwrap(), data);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn zero_threads_is_rejected_before_any_io() {
    for support_ranges in [true, false] {
        let url = range_server::start_with_options(
            body(4096),
            RangeServerOptions {
                support_ranges,
                ..RangeServerOptions::default()
            },
        );
        let dir = tempdir().unwrap();
        let target = dir.path().join("out");
        let err = download(
            &request(&url, &target, 0, 1024),
            transport(),
            None,
            CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(
            matches!(
                err.downcast_ref::<SchedulerError>(),
                Some(SchedulerError::InvalidThreads(0))
            ),
            "support_ranges={support_ranges}: {err:#}"
        );
        assert!(!target.exists(), "nothing created on disk");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn single_stream_error_page_leaves_file_untouched() {
    let url = range_server::start_with_options(
        body(4096),
        RangeServerOptions {
            support_ranges: false,
            error_status: Some("404 Not Found"),
            ..RangeServerOptions::default()
        },
    );
    let dir = tempdir().unwrap();
    let path = dir.path().join("data.bin");
    let existing = vec![0x5Au8; 8192];
    std::fs::write(&path, &existing).unwrap();

    let storage = StorageWriter::open(&path).unwrap();
    let err = tokio::task::spawn_blocking(move || {
        download_single(
            &Endpoint::new(url),
            &storage,
            0,
            &CurlOptions::default(),
            None,
            &CancellationToken::new(),
        )
    })
    .await
    .unwrap()
    .unwrap_err();

    assert!(format!("{err:#}").contains("404"), "{err:#}");
    assert_eq!(std::fs::read(&path).unwrap(), existing);
}

//! libcurl transport: one Easy2 handle per range request, performed on a
//! blocking thread and bridged to async code through channels.

use async_trait::async_trait;
use bytes::Bytes;
use curl::easy::{Easy2, Handler, List, WriteError};
use std::str;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use super::{Endpoint, RangeResponse, RangeTransport};
use crate::retry::FetchError;

/// Per-handle curl settings.
#[derive(Debug, Clone, Copy)]
pub struct CurlOptions {
    pub connect_timeout: Duration,
    /// Abort if throughput stays below `low_speed_limit` bytes/s for `low_speed_time`.
    pub low_speed_limit: u32,
    pub low_speed_time: Duration,
    /// Optional receive buffer size in bytes (None = libcurl default).
    pub buffer_size: Option<usize>,
    /// Body pieces buffered between the curl thread and the consumer.
    pub body_channel_capacity: usize,
}

impl Default for CurlOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            low_speed_limit: 1024,
            low_speed_time: Duration::from_secs(60),
            buffer_size: None,
            body_channel_capacity: 64,
        }
    }
}

/// Range transport backed by libcurl.
#[derive(Debug, Clone, Default)]
pub struct CurlTransport {
    opts: CurlOptions,
}

impl CurlTransport {
    pub fn new(opts: CurlOptions) -> Self {
        Self { opts }
    }
}

type Head = Result<(u32, bool), FetchError>;

/// Handler state for one range transfer.
struct RangeHandler {
    status: Option<u32>,
    /// Taken once the status is known and the first body piece (or the end) is seen.
    head_tx: Option<oneshot::Sender<Head>>,
    body_tx: mpsc::Sender<Result<Bytes, FetchError>>,
    cancel: CancellationToken,
}

impl RangeHandler {
    fn announce(&mut self, has_body: bool) {
        if let Some(tx) = self.head_tx.take() {
            let _ = tx.send(Ok((self.status.unwrap_or(0), has_body)));
        }
    }

    fn fail(&mut self, err: FetchError) {
        match self.head_tx.take() {
            Some(tx) => {
                let _ = tx.send(Err(err));
            }
            None => {
                let _ = self.body_tx.blocking_send(Err(err));
            }
        }
    }
}

impl Handler for RangeHandler {
    fn header(&mut self, data: &[u8]) -> bool {
        if let Ok(line) = str::from_utf8(data) {
            // Each hop of a redirect chain starts with a new status line.
            if line.starts_with("HTTP/") {
                self.status = parse_status_line(line);
            }
        }
        !self.cancel.is_cancelled()
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, WriteError> {
        if self.cancel.is_cancelled() {
            return Ok(0);
        }
        self.announce(true);
        match self.body_tx.blocking_send(Ok(Bytes::copy_from_slice(data))) {
            Ok(()) => Ok(data.len()),
            // Consumer went away: abort the transfer.
            Err(_) => Ok(0),
        }
    }

    fn progress(&mut self, _dltotal: f64, _dlnow: f64, _ultotal: f64, _ulnow: f64) -> bool {
        !self.cancel.is_cancelled()
    }
}

/// Parse the status code out of `HTTP/1.1 206 Partial Content`.
pub(crate) fn parse_status_line(line: &str) -> Option<u32> {
    line.split_whitespace().nth(1)?.parse().ok()
}

fn build_easy(
    endpoint: &Endpoint,
    start: u64,
    end: u64,
    opts: &CurlOptions,
    handler: RangeHandler,
) -> Result<Easy2<RangeHandler>, curl::Error> {
    let mut easy = Easy2::new(handler);
    easy.url(&endpoint.url)?;
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
    // curl expects "start-end" (inclusive), not "bytes=start-end"
    easy.range(&format!("{}-{}", start, end))?;
    if !endpoint.headers.is_empty() {
        let mut list = List::new();
        for (k, v) in &endpoint.headers {
            list.append(&format!("{}: {}", k.trim(), v.trim()))?;
        }
        easy.http_headers(list)?;
    }
    Ok(easy)
}

fn perform(mut easy: Easy2<RangeHandler>) {
    let result = easy.perform();
    let handler = easy.get_mut();
    if handler.cancel.is_cancelled() {
        return;
    }
    match result {
        Ok(()) => handler.announce(false),
        Err(e) => {
            tracing::debug!(error = %e, "range transfer failed");
            handler.fail(FetchError::Curl(e));
        }
    }
}

#[async_trait]
impl RangeTransport for CurlTransport {
    async fn fetch_range(
        &self,
        endpoint: &Endpoint,
        start: u64,
        end: u64,
        cancel: CancellationToken,
    ) -> Result<RangeResponse, FetchError> {
        let (head_tx, head_rx) = oneshot::channel();
        let (body_tx, body_rx) = mpsc::channel(self.opts.body_channel_capacity.max(1));
        let handler = RangeHandler {
            status: None,
            head_tx: Some(head_tx),
            body_tx,
            cancel,
        };
        let easy = build_easy(endpoint, start, end, &self.opts, handler)?;
        tokio::task::spawn_blocking(move || perform(easy));

        match head_rx.await {
            Ok(Ok((status, has_body))) => Ok(RangeResponse {
                status,
                body: has_body.then_some(body_rx),
            }),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(FetchError::Transport(
                "transfer ended without a response".to_string(),
            )),
        }
    }
}

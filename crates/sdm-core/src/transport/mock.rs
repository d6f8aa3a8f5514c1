//! In-memory transport for tests, with per-request fault injection.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{Endpoint, RangeResponse, RangeTransport};
use crate::retry::FetchError;

#[derive(Debug, Clone)]
pub(crate) enum Fault {
    /// Fail before any response.
    Refuse,
    /// Answer with this status and the full requested range.
    Status(u32),
    /// 206 with no body.
    NoBody,
    /// Close the body after this many bytes.
    CutAfter(usize),
    /// Send an error after this many bytes.
    ErrorAfter(usize),
    /// 206 whose body never produces anything until cancelled.
    Stall,
    /// Sleep before each piece.
    Slow(Duration),
}

struct Rule {
    start: u64,
    remaining: u32,
    fault: Fault,
}

pub(crate) struct MockTransport {
    data: Arc<Vec<u8>>,
    piece_size: usize,
    rules: Mutex<Vec<Rule>>,
    requests: Mutex<Vec<(u64, u64)>>,
    tokens: Mutex<Vec<CancellationToken>>,
}

impl MockTransport {
    pub(crate) fn new(data: Vec<u8>) -> Self {
        Self {
            data: Arc::new(data),
            piece_size: 4096,
            rules: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
            tokens: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn with_piece_size(mut self, piece_size: usize) -> Self {
        self.piece_size = piece_size.max(1);
        self
    }

    /// Applies `fault` to the next `times` requests starting at byte `start`.
    pub(crate) fn add_fault(&self, start: u64, times: u32, fault: Fault) {
        self.rules.lock().unwrap().push(Rule {
            start,
            remaining: times,
            fault,
        });
    }

    pub(crate) fn requests(&self) -> Vec<(u64, u64)> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn tokens(&self) -> Vec<CancellationToken> {
        self.tokens.lock().unwrap().clone()
    }

    fn take_fault(&self, start: u64) -> Option<Fault> {
        let mut rules = self.rules.lock().unwrap();
        let rule = rules
            .iter_mut()
            .find(|r| r.start == start && r.remaining > 0)?;
        rule.remaining -= 1;
        Some(rule.fault.clone())
    }
}

#[async_trait]
impl RangeTransport for MockTransport {
    async fn fetch_range(
        &self,
        _endpoint: &Endpoint,
        start: u64,
        end: u64,
        cancel: CancellationToken,
    ) -> Result<RangeResponse, FetchError> {
        self.requests.lock().unwrap().push((start, end));
        self.tokens.lock().unwrap().push(cancel.clone());

        let fault = self.take_fault(start);
        let mut status = 206;
        let mut limit = usize::MAX;
        let mut error_at = None;
        let mut delay = Duration::ZERO;
        match fault {
            Some(Fault::Refuse) => return Err(FetchError::Transport("connection refused".into())),
            Some(Fault::NoBody) => return Ok(RangeResponse { status: 206, body: None }),
            Some(Fault::Stall) => {
                let (tx, rx) = mpsc::channel(1);
                tokio::spawn(async move {
                    cancel.cancelled().await;
                    drop(tx);
                });
                return Ok(RangeResponse { status: 206, body: Some(rx) });
            }
            Some(Fault::Status(s)) => status = s,
            Some(Fault::CutAfter(n)) => limit = n,
            Some(Fault::ErrorAfter(n)) => {
                limit = n;
                error_at = Some(n);
            }
            Some(Fault::Slow(d)) => delay = d,
            None => {}
        }

        let slice_end = (end as usize + 1).min(self.data.len());
        let slice_start = (start as usize).min(slice_end);
        let payload = Bytes::copy_from_slice(&self.data[slice_start..slice_end]);
        let payload = payload.slice(..limit.min(payload.len()));
        let piece_size = self.piece_size;
        let (tx, rx) = mpsc::channel(4);
        tokio::spawn(async move {
            let mut offset = 0;
            while offset < payload.len() {
                if !delay.is_zero() {
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                if cancel.is_cancelled() {
                    return;
                }
                let next = (offset + piece_size).min(payload.len());
                if tx.send(Ok(payload.slice(offset..next))).await.is_err() {
                    return;
                }
                offset = next;
            }
            if error_at.is_some() {
                let _ = tx
                    .send(Err(FetchError::Transport("connection reset".into())))
                    .await;
            }
        });
        Ok(RangeResponse { status, body: Some(rx) })
    }
}

//! Range fetch task.
//!
//! A `ChunkStream` covers one contiguous run of chunks. On the first pull it
//! issues a single range request spanning all of them, then re-segments the
//! arriving body into exactly one buffer per chunk, in order, regardless of
//! how the transport frames the bytes.

use bytes::{Bytes, BytesMut};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::chunk::Chunk;
use crate::retry::FetchError;
use crate::transport::{BodyStream, Endpoint, RangeResponse, RangeTransport};

/// Opens `ChunkStream`s against one resource.
#[derive(Clone)]
pub struct RangeFetcher {
    transport: Arc<dyn RangeTransport>,
    endpoint: Arc<Endpoint>,
    total_length: Option<u64>,
}

impl RangeFetcher {
    pub fn new(transport: Arc<dyn RangeTransport>, endpoint: Endpoint) -> Self {
        Self {
            transport,
            endpoint: Arc::new(endpoint),
            total_length: None,
        }
    }

    /// Total resource length. When known, a request covering the whole
    /// resource may be answered with a plain 200.
    pub fn with_total_length(mut self, total_length: u64) -> Self {
        self.total_length = Some(total_length);
        self
    }

    /// Prepares a stream over `chunks`, whose first element has global index
    /// `first_index`. Nothing is sent until the first `next()`.
    pub fn open(
        &self,
        first_index: usize,
        chunks: &[Chunk],
        cancel: CancellationToken,
    ) -> ChunkStream {
        let (range_start, range_end) = match (chunks.first(), chunks.last()) {
            (Some(first), Some(last)) => (first.start, last.end),
            _ => (0, 0),
        };
        let covers_resource =
            range_start == 0 && self.total_length.map_or(false, |len| range_end + 1 == len);
        let sizes: Vec<u64> = chunks.iter().map(Chunk::len).collect();
        ChunkStream {
            transport: Arc::clone(&self.transport),
            endpoint: Arc::clone(&self.endpoint),
            range_start,
            range_end,
            covers_resource,
            first_index,
            expected: sizes.iter().sum(),
            sizes,
            pos: 0,
            buf: BytesMut::new(),
            received: 0,
            state: State::Pending,
            cancel,
        }
    }
}

enum State {
    Pending,
    Streaming(BodyStream),
    Done,
}

/// Lazy, finite, non-restartable sequence of `(chunk index, bytes)`.
pub struct ChunkStream {
    transport: Arc<dyn RangeTransport>,
    endpoint: Arc<Endpoint>,
    range_start: u64,
    range_end: u64,
    covers_resource: bool,
    first_index: usize,
    sizes: Vec<u64>,
    expected: u64,
    pos: usize,
    buf: BytesMut,
    received: u64,
    state: State,
    cancel: CancellationToken,
}

impl ChunkStream {
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Pulls the next chunk.
    ///
    /// Returns `None` once every chunk was produced, after an error was
    /// returned, or as soon as the cancel token is observed. Cancellation is
    /// never reported as an error.
    pub async fn next(&mut self) -> Option<Result<(usize, Bytes), FetchError>> {
        loop {
            if matches!(self.state, State::Done) {
                return None;
            }
            if self.cancel.is_cancelled() || self.pos == self.sizes.len() {
                self.state = State::Done;
                return None;
            }

            let want = self.sizes[self.pos] as usize;
            if self.buf.len() >= want {
                let data = self.buf.split_to(want).freeze();
                let index = self.first_index + self.pos;
                self.pos += 1;
                return Some(Ok((index, data)));
            }

            match std::mem::replace(&mut self.state, State::Done) {
                State::Pending => match self.open_body().await? {
                    Ok(body) => self.state = State::Streaming(body),
                    Err(e) => return Some(Err(e)),
                },
                State::Streaming(mut body) => {
                    let piece = tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => return None,
                        piece = body.recv() => piece,
                    };
                    match piece {
                        Some(Ok(bytes)) => {
                            self.received += bytes.len() as u64;
                            self.buf.extend_from_slice(&bytes);
                            self.state = State::Streaming(body);
                        }
                        Some(Err(e)) => return Some(Err(e)),
                        None => {
                            return Some(Err(FetchError::Truncated {
                                expected: self.expected,
                                received: self.received,
                            }))
                        }
                    }
                }
                State::Done => return None,
            }
        }
    }

    /// Issues the range request. `None` means the token fired first.
    async fn open_body(&self) -> Option<Result<BodyStream, FetchError>> {
        let response = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return None,
            r = self.transport.fetch_range(
                &self.endpoint,
                self.range_start,
                self.range_end,
                self.cancel.clone(),
            ) => r,
        };
        Some(response.and_then(|r| self.accept(r)))
    }

    fn accept(&self, response: RangeResponse) -> Result<BodyStream, FetchError> {
        let ok = response.status == 206 || (response.status == 200 && self.covers_resource);
        if !ok {
            return Err(FetchError::RangeUnsupported {
                status: response.status,
            });
        }
        response.body.ok_or(FetchError::EmptyBody)
    }
}

//! Range-capable transport abstraction.
//!
//! A transport issues one HTTP range request and hands back the status plus
//! the body as a stream of byte pieces, framed however the wire delivers
//! them. Re-segmenting those pieces into chunks is the fetch layer's job.

mod libcurl;
#[cfg(test)]
pub(crate) mod mock;

pub use libcurl::{CurlOptions, CurlTransport};
pub(crate) use libcurl::parse_status_line;

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::retry::FetchError;

/// Body pieces as they arrive; the stream ends when the sender is dropped.
pub type BodyStream = mpsc::Receiver<Result<Bytes, FetchError>>;

/// Where to fetch from: resolved URL, extra request headers and optional proxy.
#[derive(Debug, Clone, Default)]
pub struct Endpoint {
    pub url: String,
    pub headers: HashMap<String, String>,
    pub proxy: Option<String>,
}

impl Endpoint {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }
}

/// Response to a range request: final HTTP status and, if any bytes came back, the body.
#[derive(Debug)]
pub struct RangeResponse {
    pub status: u32,
    pub body: Option<BodyStream>,
}

/// Issues single range requests. `end` is inclusive.
///
/// Implementations must stop producing body pieces soon after `cancel` fires
/// or after the body receiver is dropped.
#[async_trait]
pub trait RangeTransport: Send + Sync + 'static {
    async fn fetch_range(
        &self,
        endpoint: &Endpoint,
        start: u64,
        end: u64,
        cancel: CancellationToken,
    ) -> Result<RangeResponse, FetchError>;
}

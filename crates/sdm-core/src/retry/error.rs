//! Range fetch error type.

use thiserror::Error;

/// Error ending one range fetch. Every variant is retryable by the scheduler;
/// deliberate cancellation is not an error and never shows up here.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The server answered a sub-resource range request without 206 Partial Content.
    #[error("range request not honoured (HTTP {status})")]
    RangeUnsupported { status: u32 },
    /// The response carried no body at all.
    #[error("response has no body")]
    EmptyBody,
    /// The body ended before every chunk of the range was received.
    #[error("body ended early: expected {expected} bytes, got {received}")]
    Truncated { expected: u64, received: u64 },
    /// libcurl reported an error (timeout, connection, etc.).
    #[error("transfer failed: {0}")]
    Curl(#[from] curl::Error),
    /// Any other transport failure.
    #[error("transport error: {0}")]
    Transport(String),
}

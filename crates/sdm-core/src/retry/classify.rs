//! Classify HTTP status and curl errors into retry error kinds.

use super::error::FetchError;
use super::policy::ErrorKind;

/// Classify an HTTP status code answered to a range request.
pub fn classify_http_status(code: u32) -> ErrorKind {
    match code {
        429 | 503 => ErrorKind::Throttled,
        500..=599 => ErrorKind::Http5xx(code as u16),
        200..=299 => ErrorKind::RangeUnsupported,
        _ => ErrorKind::Other,
    }
}

/// Classify a curl error.
pub fn classify_curl_error(e: &curl::Error) -> ErrorKind {
    if e.is_operation_timedout() {
        return ErrorKind::Timeout;
    }
    if e.is_couldnt_connect()
        || e.is_couldnt_resolve_host()
        || e.is_couldnt_resolve_proxy()
        || e.is_read_error()
        || e.is_recv_error()
        || e.is_send_error()
        || e.is_got_nothing()
        || e.is_partial_file()
    {
        return ErrorKind::Connection;
    }
    ErrorKind::Other
}

/// Classify a fetch error into an ErrorKind.
pub fn classify(e: &FetchError) -> ErrorKind {
    match e {
        FetchError::Curl(ce) => classify_curl_error(ce),
        FetchError::RangeUnsupported { status } => classify_http_status(*status),
        FetchError::Truncated { .. } => ErrorKind::Connection,
        FetchError::EmptyBody | FetchError::Transport(_) => ErrorKind::Other,
    }
}

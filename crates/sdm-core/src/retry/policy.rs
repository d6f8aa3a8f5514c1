use std::time::Duration;

/// High-level classification of a fetch error.
///
/// Every kind is retried by the scheduler; the kind only drives logging and
/// the throttle counter of the run summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Operation timed out (connect/low-speed).
    Timeout,
    /// Server asked us to slow down (e.g. 429, 503).
    Throttled,
    /// Network-level failure (connection reset, DNS, etc.).
    Connection,
    /// 5xx status other than throttling.
    Http5xx(u16),
    /// Server answered a range request with a full or otherwise wrong response.
    RangeUnsupported,
    /// Anything else.
    Other,
}

/// Consecutive-failure budget plus exponential backoff between reissues.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Consecutive failures tolerated per task (`None` = unbounded).
    pub max_retries: Option<u32>,
    /// Base delay for backoff; zero reissues immediately.
    pub base_delay: Duration,
    /// Upper bound on backoff delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: None,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Policy with a bounded budget and no delay between reissues.
    pub fn immediate(max_retries: Option<u32>) -> Self {
        Self {
            max_retries,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// True once `consecutive` failures exceed the budget.
    pub fn exhausted(&self, consecutive: u32) -> bool {
        self.max_retries.map_or(false, |max| consecutive > max)
    }

    /// Delay before reissuing after `consecutive` failures (1-based).
    ///
    /// `base * 2^(consecutive-1)`, capped at `max_delay`.
    pub fn backoff(&self, consecutive: u32) -> Duration {
        if self.base_delay.is_zero() {
            return Duration::ZERO;
        }
        let exp = 1u32 << consecutive.saturating_sub(1).min(8);
        self.base_delay.saturating_mul(exp).min(self.max_delay)
    }
}

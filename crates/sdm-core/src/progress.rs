//! Progress snapshots sent to the CLI while a download runs.
//!
//! Consumers derive rate and ETA from the snapshot; nothing here keeps state.

/// Snapshot of download progress.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressStats {
    /// Bytes written so far.
    pub bytes_done: u64,
    /// Bytes this run will write in total.
    pub total_bytes: u64,
    /// Seconds since the download started.
    pub elapsed_secs: f64,
    pub chunks_done: usize,
    /// Zero for a single-stream download.
    pub chunk_count: usize,
}

impl ProgressStats {
    /// Bytes per second (0 if no time has passed).
    pub fn bytes_per_sec(&self) -> f64 {
        if self.elapsed_secs <= 0.0 {
            return 0.0;
        }
        self.bytes_done as f64 / self.elapsed_secs
    }

    /// Estimated seconds remaining (None while the rate is unknown).
    pub fn eta_secs(&self) -> Option<f64> {
        let remaining = self.total_bytes.saturating_sub(self.bytes_done);
        if remaining == 0 {
            return Some(0.0);
        }
        let rate = self.bytes_per_sec();
        if rate <= 0.0 {
            return None;
        }
        Some(remaining as f64 / rate)
    }

    /// Fraction complete in [0.0, 1.0].
    pub fn fraction(&self) -> f64 {
        if self.total_bytes == 0 {
            return 1.0;
        }
        (self.bytes_done as f64 / self.total_bytes as f64).min(1.0)
    }
}

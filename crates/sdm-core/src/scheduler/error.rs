use thiserror::Error;

use crate::retry::FetchError;

/// Why a scheduler run stopped without delivering every chunk.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("thread count must be at least 1 (got {0})")]
    InvalidThreads(usize),
    /// One task failed more consecutive times than the retry policy allows.
    #[error("task {task} gave up after {attempts} consecutive failures: {source}")]
    RetriesExhausted {
        task: usize,
        attempts: u32,
        #[source]
        source: FetchError,
    },
    /// The shutdown token fired.
    #[error("download cancelled")]
    Cancelled,
    #[error("fetch worker panicked")]
    WorkerPanicked,
}

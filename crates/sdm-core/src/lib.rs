//! Parallel, resumable HTTP range downloader.
//!
//! A resource is split into fixed-size chunks; a work-stealing scheduler
//! streams contiguous chunk ranges over concurrent range requests and writes
//! each chunk at its offset in the destination file.

pub mod checksum;
pub mod chunk;
pub mod config;
pub mod download;
pub mod fetch;
pub mod filename;
pub mod logging;
pub mod probe;
pub mod progress;
pub mod retry;
pub mod scheduler;
pub mod single;
pub mod sink;
pub mod storage;
pub mod transport;

pub use download::{download, DownloadOutcome, DownloadRequest};
pub use progress::ProgressStats;
pub use scheduler::{RunSummary, SchedulerError};

//! Chunk sinks: where delivered chunks go.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

use crate::chunk::{Chunk, ChunkBitmap};
use crate::progress::ProgressStats;
use crate::storage::StorageWriter;

/// Receives each chunk exactly once, in any order. `index` is the chunk's
/// position in the scheduled list; `chunk` carries its absolute byte range.
#[async_trait]
pub trait ChunkSink: Send + Sync {
    async fn write_chunk(&self, index: usize, chunk: Chunk, data: Bytes);
}

/// Writes chunks into the output file at their byte offsets.
///
/// A failed write is retried after `write_retry_delay` until it succeeds.
/// Progress is counted once per chunk index even if a chunk were delivered
/// twice, and a snapshot is sent at construction and after every new chunk.
pub struct FileSink {
    storage: StorageWriter,
    completed: Mutex<ChunkBitmap>,
    chunk_count: usize,
    total_bytes: u64,
    bytes_done: AtomicU64,
    started: Instant,
    write_retry_delay: Duration,
    progress_tx: Option<mpsc::UnboundedSender<ProgressStats>>,
}

impl FileSink {
    pub fn new(
        storage: StorageWriter,
        chunk_count: usize,
        total_bytes: u64,
        write_retry_delay: Duration,
        progress_tx: Option<mpsc::UnboundedSender<ProgressStats>>,
    ) -> Self {
        let sink = Self {
            storage,
            completed: Mutex::new(ChunkBitmap::new(chunk_count)),
            chunk_count,
            total_bytes,
            bytes_done: AtomicU64::new(0),
            started: Instant::now(),
            write_retry_delay,
            progress_tx,
        };
        sink.report(0);
        sink
    }

    pub fn bytes_done(&self) -> u64 {
        self.bytes_done.load(Ordering::Relaxed)
    }

    pub fn chunks_done(&self) -> usize {
        self.completed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .completed_count()
    }

    fn report(&self, chunks_done: usize) {
        if let Some(tx) = &self.progress_tx {
            let _ = tx.send(ProgressStats {
                bytes_done: self.bytes_done(),
                total_bytes: self.total_bytes,
                elapsed_secs: self.started.elapsed().as_secs_f64(),
                chunks_done,
                chunk_count: self.chunk_count,
            });
        }
    }

    async fn write_until_ok(&self, chunk: Chunk, data: Bytes) {
        let mut attempt = 0u32;
        loop {
            let storage = self.storage.clone();
            let payload = data.clone();
            let result =
                tokio::task::spawn_blocking(move || storage.write_at(chunk.start, &payload)).await;
            let err = match result {
                Ok(Ok(())) => return,
                Ok(Err(e)) => e,
                Err(join) => anyhow::anyhow!("write task: {}", join),
            };
            attempt += 1;
            tracing::warn!(
                offset = chunk.start,
                len = data.len(),
                attempt,
                error = %err,
                "chunk write failed, retrying"
            );
            tokio::time::sleep(self.write_retry_delay).await;
        }
    }
}

#[async_trait]
impl ChunkSink for FileSink {
    async fn write_chunk(&self, index: usize, chunk: Chunk, data: Bytes) {
        let len = data.len() as u64;
        self.write_until_ok(chunk, data).await;

        let first = {
            let mut completed = self.completed.lock().unwrap_or_else(PoisonError::into_inner);
            completed
                .set_completed(index)
                .then(|| completed.completed_count())
        };
        match first {
            Some(chunks_done) => {
                self.bytes_done.fetch_add(len, Ordering::Relaxed);
                self.report(chunks_done);
            }
            None => tracing::debug!(index, "chunk already accounted, not counted again"),
        }
    }
}

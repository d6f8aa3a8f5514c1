//! Work-stealing chunk scheduler.
//!
//! The chunk list is partitioned into one contiguous range per task. Each task
//! streams its range through a single range request. When a task runs out of
//! work it steals the upper half of the busiest task's remaining range, and
//! retires once nobody has spare work left. Failed requests are reissued from
//! the first undelivered chunk with backoff until the retry policy gives up.
//!
//! All bookkeeping lives in one coordinator loop. Fetch pumps run as tokio
//! tasks and report back over a channel; every report carries the generation
//! of the request that produced it so reports from replaced requests are
//! dropped.

mod error;
mod pump;
mod table;


pub use error::SchedulerError;

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::chunk::Chunk;
use crate::fetch::RangeFetcher;
use crate::retry::{classify, ErrorKind, FetchError, RetryPolicy};
use crate::sink::ChunkSink;

use pump::Event;
use table::TaskTable;

const EVENT_BUFFER: usize = 64;

/// What happened during a successful run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub chunks: usize,
    /// Requests reissued after a failure.
    pub retries: u32,
    pub steals: u32,
    /// Failures the server signalled as throttling (429/503).
    pub throttle_events: u32,
}

/// Downloads every chunk in `chunks` with up to `threads` concurrent range
/// requests, handing each chunk to `sink` exactly once.
///
/// Resolves once all chunks are delivered. Fails if `threads` is zero, if one
/// task exhausts its retries (every other request is cancelled first), or if
/// `shutdown` fires. An empty chunk list completes without any request.
pub async fn run<S>(
    threads: usize,
    chunks: &[Chunk],
    fetcher: &RangeFetcher,
    sink: &S,
    policy: &RetryPolicy,
    shutdown: &CancellationToken,
) -> Result<RunSummary, SchedulerError>
where
    S: ChunkSink + ?Sized,
{
    if threads < 1 {
        return Err(SchedulerError::InvalidThreads(threads));
    }
    if chunks.is_empty() {
        return Ok(RunSummary::default());
    }

    let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
    let table = TaskTable::partition(chunks.len(), threads);
    tracing::debug!(
        chunks = chunks.len(),
        tasks = table.live(),
        "starting scheduler"
    );

    let mut coordinator = Coordinator {
        chunks,
        fetcher,
        sink,
        policy,
        run_token: shutdown.child_token(),
        table,
        pumps: JoinSet::new(),
        events_tx,
        summary: RunSummary {
            chunks: chunks.len(),
            ..RunSummary::default()
        },
    };
    let result = coordinator.drive(events_rx, shutdown).await;
    coordinator.run_token.cancel();
    coordinator.pumps.shutdown().await;
    result
}

struct Coordinator<'a, S: ?Sized> {
    chunks: &'a [Chunk],
    fetcher: &'a RangeFetcher,
    sink: &'a S,
    policy: &'a RetryPolicy,
    /// Parent of every task token; cancelling it stops all requests.
    run_token: CancellationToken,
    table: TaskTable,
    pumps: JoinSet<()>,
    events_tx: mpsc::Sender<Event>,
    summary: RunSummary,
}

impl<S: ChunkSink + ?Sized> Coordinator<'_, S> {
    async fn drive(
        &mut self,
        mut events: mpsc::Receiver<Event>,
        shutdown: &CancellationToken,
    ) -> Result<RunSummary, SchedulerError> {
        let initial: Vec<usize> = self.table.ids().collect();
        for task in initial {
            self.spawn_fetch(task, Duration::ZERO);
        }

        while self.table.live() > 0 {
            let event = tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    tracing::info!("shutdown requested, cancelling range requests");
                    self.table.cancel_all();
                    return Err(SchedulerError::Cancelled);
                }
                event = events.recv() => event,
                Some(joined) = self.pumps.join_next() => {
                    if let Err(e) = joined {
                        if e.is_panic() {
                            tracing::error!(error = %e, "fetch pump panicked");
                            self.table.cancel_all();
                            return Err(SchedulerError::WorkerPanicked);
                        }
                    }
                    continue;
                }
            };
            // The coordinator holds a sender, so the channel cannot close here.
            let Some(event) = event else { break };
            match event {
                Event::Chunk {
                    task,
                    generation,
                    index,
                    data,
                } => self.on_chunk(task, generation, index, data).await,
                Event::Failed {
                    task,
                    generation,
                    error,
                } => self.on_failure(task, generation, error)?,
            }
        }

        tracing::debug!(
            retries = self.summary.retries,
            steals = self.summary.steals,
            "all chunks delivered"
        );
        Ok(self.summary.clone())
    }

    async fn on_chunk(&mut self, task: usize, generation: u64, index: usize, data: bytes::Bytes) {
        let Some(slot) = self.table.current_mut(task, generation) else {
            tracing::trace!(task, index, "dropping chunk from a replaced request");
            return;
        };
        if index != slot.cursor || slot.cursor >= slot.end {
            tracing::trace!(task, index, cursor = slot.cursor, "dropping chunk outside owned range");
            return;
        }

        self.sink.write_chunk(index, self.chunks[index], data).await;

        if self.table.record_delivery(task) {
            self.on_exhausted(task);
        }
    }

    /// The task's range is empty: stop a request that still covers stolen
    /// chunks, then steal more work or retire.
    fn on_exhausted(&mut self, task: usize) {
        if let Some(slot) = self.table.get_mut(task) {
            if slot.stolen {
                slot.stolen = false;
                let fresh = self.run_token.child_token();
                self.table.reissue(task, fresh);
            }
        }

        let Some(victim) = self.table.pick_victim(task) else {
            self.table.retire(task);
            tracing::debug!(task, live = self.table.live(), "task retired");
            return;
        };
        if let Some(steal) = self.table.steal(task, victim) {
            self.summary.steals += 1;
            tracing::debug!(
                thief = task,
                victim = steal.victim,
                from = steal.split,
                to = steal.end,
                "stole chunks"
            );
            self.spawn_fetch(task, Duration::ZERO);
        }
    }

    fn on_failure(
        &mut self,
        task: usize,
        generation: u64,
        error: FetchError,
    ) -> Result<(), SchedulerError> {
        let Some(slot) = self.table.current_mut(task, generation) else {
            tracing::trace!(task, error = %error, "ignoring failure of a replaced request");
            return Ok(());
        };
        if slot.cursor >= slot.end {
            self.on_exhausted(task);
            return Ok(());
        }

        let kind = classify(&error);
        if kind == ErrorKind::Throttled {
            self.summary.throttle_events += 1;
        }
        slot.retry_count += 1;
        let attempts = slot.retry_count;
        let (cursor, end) = (slot.cursor, slot.end);

        if self.policy.exhausted(attempts) {
            tracing::error!(task, attempts, error = %error, "range fetch failed, giving up");
            self.table.cancel_all();
            return Err(SchedulerError::RetriesExhausted {
                task,
                attempts,
                source: error,
            });
        }

        slot.stolen = false;
        self.summary.retries += 1;
        let delay = self.policy.backoff(attempts);
        tracing::warn!(
            task,
            attempts,
            ?kind,
            from = cursor,
            to = end,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "range fetch failed, reissuing"
        );
        self.spawn_fetch(task, delay);
        Ok(())
    }

    /// Replaces the task's request with a new one over `[cursor, end)`.
    fn spawn_fetch(&mut self, task: usize, delay: Duration) {
        let fresh = self.run_token.child_token();
        let Some(next) = self.table.reissue(task, fresh) else {
            return;
        };
        let stream = self
            .fetcher
            .open(next.cursor, &self.chunks[next.cursor..next.end], next.cancel);
        self.pumps.spawn(pump::pump(
            task,
            next.generation,
            stream,
            delay,
            self.events_tx.clone(),
        ));
    }
}

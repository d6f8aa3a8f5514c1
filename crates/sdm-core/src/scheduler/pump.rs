//! Per-task fetch pump: drains one `ChunkStream` into the coordinator.

use bytes::Bytes;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::fetch::ChunkStream;
use crate::retry::FetchError;

pub(super) enum Event {
    Chunk {
        task: usize,
        generation: u64,
        index: usize,
        data: Bytes,
    },
    Failed {
        task: usize,
        generation: u64,
        error: FetchError,
    },
}

/// Waits `delay` (unless cancelled first), then forwards every item of
/// `stream`. Stops after the first error, on cancellation, or when the
/// coordinator has gone away.
pub(super) async fn pump(
    task: usize,
    generation: u64,
    mut stream: ChunkStream,
    delay: Duration,
    events: mpsc::Sender<Event>,
) {
    if !delay.is_zero() {
        let cancel = stream.cancel_token().clone();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }
    }
    while let Some(item) = stream.next().await {
        let (event, last) = match item {
            Ok((index, data)) => (
                Event::Chunk {
                    task,
                    generation,
                    index,
                    data,
                },
                false,
            ),
            Err(error) => (
                Event::Failed {
                    task,
                    generation,
                    error,
                },
                true,
            ),
        };
        if events.send(event).await.is_err() || last {
            return;
        }
    }
}

//! Task table: the scheduler's per-task bookkeeping.
//!
//! Only the coordinator loop touches the table, so none of this is shared or
//! locked. Task ids are slot indices and stay stable for the whole run.

use tokio_util::sync::CancellationToken;

/// One task's live state. Owns chunk indices `[cursor, end)`.
#[derive(Debug)]
pub(crate) struct TaskSlot {
    pub end: usize,
    pub cursor: usize,
    /// Consecutive failures since the last delivered chunk.
    pub retry_count: u32,
    /// Set when a thief took the tail of this range while a request was in flight.
    pub stolen: bool,
    /// Bumped whenever the underlying request is replaced; events tagged with
    /// an older generation are ignored.
    pub generation: u64,
    pub cancel: CancellationToken,
}

impl TaskSlot {
    fn new(start: usize, end: usize) -> Self {
        Self {
            end,
            cursor: start,
            retry_count: 0,
            stolen: false,
            generation: 0,
            cancel: CancellationToken::new(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.end.saturating_sub(self.cursor)
    }

    /// Chunks a thief may take: everything after the one in flight.
    pub fn spare(&self) -> usize {
        self.remaining().saturating_sub(1)
    }
}

/// Result of a successful steal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Steal {
    pub victim: usize,
    pub split: usize,
    pub end: usize,
}

/// Where a task's next request should start and end, and how to tag it.
#[derive(Debug, Clone)]
pub(crate) struct Reissue {
    pub cursor: usize,
    pub end: usize,
    pub generation: u64,
    pub cancel: CancellationToken,
}

#[derive(Debug, Default)]
pub(crate) struct TaskTable {
    slots: Vec<Option<TaskSlot>>,
    live: usize,
}

impl TaskTable {
    /// Splits `chunk_count` chunks into `min(threads, chunk_count)` contiguous
    /// ranges. The first `chunk_count % k` ranges get one extra chunk.
    pub fn partition(chunk_count: usize, threads: usize) -> Self {
        let k = threads.min(chunk_count);
        if k == 0 {
            return Self::default();
        }
        let base = chunk_count / k;
        let extra = chunk_count % k;
        let mut slots = Vec::with_capacity(k);
        let mut start = 0;
        for i in 0..k {
            let len = base + usize::from(i < extra);
            slots.push(Some(TaskSlot::new(start, start + len)));
            start += len;
        }
        Self { slots, live: k }
    }

    /// Number of tasks not yet retired.
    pub fn live(&self) -> usize {
        self.live
    }

    pub fn ids(&self) -> impl Iterator<Item = usize> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(id, s)| s.as_ref().map(|_| id))
    }

    #[cfg(test)]
    pub fn get(&self, task: usize) -> Option<&TaskSlot> {
        self.slots.get(task).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, task: usize) -> Option<&mut TaskSlot> {
        self.slots.get_mut(task).and_then(Option::as_mut)
    }

    /// The task, if it is live and `generation` is still its current one.
    pub fn current_mut(&mut self, task: usize, generation: u64) -> Option<&mut TaskSlot> {
        self.get_mut(task).filter(|s| s.generation == generation)
    }

    /// Advances the cursor past a delivered chunk and clears the retry
    /// counter. Returns true if the task's range is now exhausted.
    pub fn record_delivery(&mut self, task: usize) -> bool {
        match self.get_mut(task) {
            Some(slot) => {
                slot.cursor += 1;
                slot.retry_count = 0;
                slot.cursor >= slot.end
            }
            None => false,
        }
    }

    /// Live task other than `thief` with the most spare chunks; the lowest
    /// id wins ties. `None` if nobody has at least one spare chunk.
    pub fn pick_victim(&self, thief: usize) -> Option<usize> {
        let mut best: Option<(usize, usize)> = None;
        for (id, slot) in self.slots.iter().enumerate() {
            let Some(slot) = slot else { continue };
            if id == thief {
                continue;
            }
            let spare = slot.spare();
            if spare >= 1 && best.map_or(true, |(_, s)| spare > s) {
                best = Some((id, spare));
            }
        }
        best.map(|(id, _)| id)
    }

    /// Moves the upper half of `victim`'s remaining range to `thief`.
    ///
    /// The split point is `ceil((cursor + end) / 2)`, which leaves the victim
    /// at least its in-flight chunk and gives the thief at least one.
    pub fn steal(&mut self, thief: usize, victim: usize) -> Option<Steal> {
        let v = self.get_mut(victim)?;
        if v.spare() == 0 {
            return None;
        }
        let end = v.end;
        let split = (v.cursor + v.end + 1) / 2;
        v.end = split;
        v.stolen = true;

        let t = self.get_mut(thief)?;
        t.cursor = split;
        t.end = end;
        t.retry_count = 0;
        t.stolen = false;
        Some(Steal { victim, split, end })
    }

    /// Installs `cancel` as the task's token, cancels the old one and bumps the
    /// generation. Returns what the new request should cover.
    pub fn reissue(&mut self, task: usize, cancel: CancellationToken) -> Option<Reissue> {
        let slot = self.get_mut(task)?;
        let old = std::mem::replace(&mut slot.cancel, cancel.clone());
        old.cancel();
        slot.generation += 1;
        Some(Reissue {
            cursor: slot.cursor,
            end: slot.end,
            generation: slot.generation,
            cancel,
        })
    }

    /// Removes the task. Its token is cancelled.
    pub fn retire(&mut self, task: usize) -> Option<TaskSlot> {
        let slot = self.slots.get_mut(task)?.take()?;
        slot.cancel.cancel();
        self.live -= 1;
        Some(slot)
    }

    pub fn cancel_all(&self) {
        for slot in self.slots.iter().flatten() {
            slot.cancel.cancel();
        }
    }
}

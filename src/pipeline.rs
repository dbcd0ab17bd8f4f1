//! Log ingestion: bounded per-source queues and the batched flush cycle.
//!
//! Every log source (each tailed file plus the supervised process's own
//! output) owns a [`LogQueue`] with a hard capacity. Producers enqueue lines
//! as fast as they arrive; the flush cycle drains one bounded batch at a time
//! and yields between batches, so a single noisy source can never starve user
//! input or the other sources. When a producer outruns the consumer the
//! oldest excess lines are dropped and a single marker line reports the
//! overflow episode on the next flush.

use std::collections::VecDeque;

/// Marker emitted once per overflow episode, ahead of the retained lines.
pub const OVERFLOW_MARKER: &str = "[rundash] backlog trimmed: log burst exceeded the queue";
/// Marker emitted after the display is wiped at its line limit.
pub const CLEARED_MARKER: &str = "[rundash] log cleared: display line limit reached";

/// Destination of flushed lines; the display layer implements this.
pub trait FlushSink {
    /// Appends one line to a display slot.
    fn append(&mut self, slot: usize, line: &str);
    /// Number of lines the slot currently retains.
    fn retained(&self, slot: usize) -> usize;
    /// Wipes the slot.
    fn clear(&mut self, slot: usize);
}

/// Bounded line queue between one producer and the flush cycle.
#[derive(Debug)]
pub struct LogQueue {
    pending: VecDeque<String>,
    capacity: usize,
    overflowed: bool,
}

impl LogQueue {
    fn new(capacity: usize) -> Self {
        Self {
            pending: VecDeque::with_capacity(capacity.min(1024)),
            capacity: capacity.max(1),
            overflowed: false,
        }
    }

    /// Appends a line, discarding the oldest excess beyond capacity.
    fn push(&mut self, line: String) {
        self.pending.push_back(line);
        while self.pending.len() > self.capacity {
            self.pending.pop_front();
            self.overflowed = true;
        }
    }

    fn pop_batch(&mut self, max: usize) -> Vec<String> {
        let take = max.min(self.pending.len());
        self.pending.drain(..take).collect()
    }

    fn take_overflow(&mut self) -> bool {
        std::mem::take(&mut self.overflowed)
    }

    fn reset(&mut self) {
        self.pending.clear();
        self.overflowed = false;
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Per-source queues plus the flush bookkeeping.
#[derive(Debug)]
pub struct Pipeline {
    queues: Vec<LogQueue>,
    armed: Vec<bool>,
    batch_size: usize,
    max_lines: usize,
}

impl Pipeline {
    pub fn new(slots: usize, capacity: usize, batch_size: usize, max_lines: usize) -> Self {
        Self {
            queues: (0..slots).map(|_| LogQueue::new(capacity)).collect(),
            armed: vec![false; slots],
            batch_size: batch_size.max(1),
            max_lines: max_lines.max(1),
        }
    }

    /// Queues a line for a slot. Returns `true` when the slot's flush cycle
    /// was idle and must now be armed by the caller.
    pub fn enqueue(&mut self, slot: usize, line: String) -> bool {
        let Some(queue) = self.queues.get_mut(slot) else {
            return false;
        };
        queue.push(line);
        if self.armed[slot] {
            false
        } else {
            self.armed[slot] = true;
            true
        }
    }

    /// Drains one batch into the sink. Returns `true` while lines remain
    /// pending, in which case the caller re-arms the slot on the next
    /// scheduling opportunity instead of looping here.
    pub fn flush_batch(&mut self, slot: usize, sink: &mut dyn FlushSink) -> bool {
        let Some(queue) = self.queues.get_mut(slot) else {
            return false;
        };
        let batch = queue.pop_batch(self.batch_size);
        let overflowed = queue.take_overflow();

        if overflowed {
            sink.append(slot, OVERFLOW_MARKER);
        }
        for line in &batch {
            sink.append(slot, line);
        }
        if sink.retained(slot) > self.max_lines {
            sink.clear(slot);
            sink.append(slot, CLEARED_MARKER);
        }

        let more = !queue.is_empty();
        self.armed[slot] = more;
        more
    }

    /// Drops a slot's pending backlog, e.g. when its source is re-pointed.
    pub fn reset_slot(&mut self, slot: usize) {
        if let Some(queue) = self.queues.get_mut(slot) {
            queue.reset();
        }
    }

    pub fn pending(&self, slot: usize) -> usize {
        self.queues.get(slot).map(LogQueue::len).unwrap_or(0)
    }
}

/// Work queue of slots awaiting a flush batch.
///
/// The main loop pops one slot per pass and flushes a single batch, which is
/// the cooperative-yield contract: each batch is one unit of work between
/// event polls. A slot is present at most once because only a freshly-armed
/// enqueue or a `flush_batch` that reported more work pushes it.
#[derive(Debug, Default)]
pub struct FlushPump {
    queue: VecDeque<usize>,
}

impl FlushPump {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arm(&mut self, slot: usize) {
        self.queue.push_back(slot);
    }

    pub fn next(&mut self) -> Option<usize> {
        self.queue.pop_front()
    }

    pub fn has_work(&self) -> bool {
        !self.queue.is_empty()
    }
}

//! Timer queue for deadline management.
//!
//! A min-heap of `(deadline, sequence)` entries plus a table of the tasks
//! themselves. Cancellation removes the task from the table and leaves the
//! heap entry behind; stale entries are skipped when popped.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use super::{Task, TimerHandle};
use crate::types::Time;

/// A timer entry in the heap.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
struct TimerEntry {
    deadline: Time,
    /// Insertion order; breaks deadline ties so equal deadlines run FIFO.
    seq: u64,
}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap (earliest deadline first)
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Pending tasks ordered by deadline, FIFO among equal deadlines.
#[derive(Default)]
pub struct TimerQueue {
    heap: BinaryHeap<TimerEntry>,
    tasks: HashMap<u64, Task>,
    next_seq: u64,
}

impl TimerQueue {
    /// Creates a new empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of live (not cancelled) timers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Returns true if no live timers remain.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Adds a task with the given deadline.
    pub fn insert(&mut self, deadline: Time, task: Task) -> TimerHandle {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(TimerEntry { deadline, seq });
        self.tasks.insert(seq, task);
        TimerHandle::from_raw(seq)
    }

    /// Removes a pending task. Returns `false` if it is not pending.
    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        self.tasks.remove(&handle.as_u64()).is_some()
    }

    /// Returns the earliest live deadline, if any.
    pub fn peek_deadline(&mut self) -> Option<Time> {
        self.discard_stale();
        self.heap.peek().map(|e| e.deadline)
    }

    /// Pops the earliest task if its deadline is `<= now`.
    pub fn pop_due(&mut self, now: Time) -> Option<(Time, Task)> {
        self.discard_stale();
        let entry = *self.heap.peek()?;
        if entry.deadline > now {
            return None;
        }
        self.heap.pop();
        self.tasks.remove(&entry.seq).map(|task| (entry.deadline, task))
    }

    /// Sequence number the next inserted task will get.
    ///
    /// Tasks with a sequence below the watermark were queued before it was
    /// read.
    #[must_use]
    pub fn watermark(&self) -> u64 {
        self.next_seq
    }

    /// Like [`pop_due`](Self::pop_due), restricted to tasks queued before
    /// `watermark`.
    pub fn pop_due_before(&mut self, now: Time, watermark: u64) -> Option<(Time, Task)> {
        self.discard_stale();
        let entry = *self.heap.peek()?;
        if entry.seq >= watermark {
            return None;
        }
        self.pop_due(now)
    }

    /// Drops every pending task.
    pub fn clear(&mut self) {
        self.heap.clear();
        self.tasks.clear();
    }

    fn discard_stale(&mut self) {
        while let Some(entry) = self.heap.peek() {
            if self.tasks.contains_key(&entry.seq) {
                break;
            }
            self.heap.pop();
        }
    }
}

impl std::fmt::Debug for TimerQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerQueue")
            .field("pending", &self.tasks.len())
            .field("next_seq", &self.next_seq)
            .finish()
    }
}

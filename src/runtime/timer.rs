//! The timer min-heap.
//!
//! Entries are ordered by `(deadline, sequence)`; the sequence number makes
//! expiry order deterministic for equal deadlines and guarantees that of
//! two delays scheduled from the same point, the shorter (or earlier) one
//! never fires later than the other.

use crate::future::{Promise, Void};
use crate::runtime::queue::Priority;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

pub(crate) struct TimerEntry {
    pub(crate) deadline: f64,
    seq: u64,
    pub(crate) priority: Priority,
    pub(crate) promise: Promise<Void>,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq && self.deadline.total_cmp(&other.deadline) == Ordering::Equal
    }
}

impl Eq for TimerEntry {}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerEntry {
    // Reversed so that BinaryHeap (a max-heap) pops the earliest deadline.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .deadline
            .total_cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Default)]
pub(crate) struct TimerHeap {
    heap: BinaryHeap<TimerEntry>,
    seq: u64,
}

impl TimerHeap {
    pub(crate) fn add(&mut self, deadline: f64, priority: Priority, promise: Promise<Void>) {
        let seq = self.seq;
        self.seq += 1;
        self.heap.push(TimerEntry {
            deadline,
            seq,
            priority,
            promise,
        });
    }

    /// Pops the earliest entry whose deadline has passed.
    pub(crate) fn pop_expired(&mut self, now: f64) -> Option<TimerEntry> {
        if self.heap.peek()?.deadline <= now {
            self.heap.pop()
        } else {
            None
        }
    }

    pub(crate) fn next_deadline(&self) -> Option<f64> {
        self.heap.peek().map(|e| e.deadline)
    }

    pub(crate) fn len(&self) -> usize {
        self.heap.len()
    }
}

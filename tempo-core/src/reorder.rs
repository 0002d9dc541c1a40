//! Min-ordered holding area for accepted events. An entry is released once its key is at or below
//! `watermark - lag`: every later accepted event starts at or after that cutoff, so nothing can
//! overtake a released entry.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use crate::message::{OutputEvent, Timestamp};

/// Buffered event keyed by its effective (possibly adjusted) start time. The sequence number keeps
/// entries with equal keys in arrival order.
#[derive(Debug)]
struct Pending<T> {
    key: Timestamp,
    seq: u64,
    event: OutputEvent<T>,
}

impl<T> PartialEq for Pending<T> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.seq == other.seq
    }
}

impl<T> Eq for Pending<T> {}

impl<T> Ord for Pending<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key
            .cmp(&other.key)
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

impl<T> PartialOrd for Pending<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug)]
pub(crate) struct ReorderBuffer<T> {
    heap: BinaryHeap<Reverse<Pending<T>>>,
    next_seq: u64,
}

impl<T> Default for ReorderBuffer<T> {
    fn default() -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_seq: 0,
        }
    }
}

impl<T> ReorderBuffer<T> {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, key: Timestamp, event: OutputEvent<T>) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Reverse(Pending { key, seq, event }));
    }

    /// Pops every entry with key `<= cutoff`, smallest first.
    pub(crate) fn release(&mut self, cutoff: Timestamp) -> Vec<(Timestamp, OutputEvent<T>)> {
        let mut released = Vec::new();
        while self
            .heap
            .peek()
            .is_some_and(|Reverse(pending)| pending.key <= cutoff)
        {
            if let Some(Reverse(pending)) = self.heap.pop() {
                released.push((pending.key, pending.event));
            }
        }
        released
    }

    /// Pops everything, smallest first. Used at end of input when no cutoff applies.
    pub(crate) fn drain(&mut self) -> Vec<(Timestamp, OutputEvent<T>)> {
        let mut drained = Vec::with_capacity(self.heap.len());
        while let Some(Reverse(pending)) = self.heap.pop() {
            drained.push((pending.key, pending.event));
        }
        drained
    }

    pub(crate) fn len(&self) -> usize {
        self.heap.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Smallest buffered key.
    pub(crate) fn peek_key(&self) -> Option<Timestamp> {
        self.heap.peek().map(|Reverse(pending)| pending.key)
    }
}

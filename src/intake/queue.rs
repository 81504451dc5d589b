//! Priority intake queue
//!
//! Max-priority queue with FIFO ordering among equal priorities: entries
//! carry a monotonic sequence number so later insertions of the same
//! priority drain after earlier ones. Non-blocking by design; the consumer
//! polls on a short interval rather than parking on the queue.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

struct Entry<T> {
    priority: u8,
    seq: u64,
    item: T,
}

impl<T> PartialEq for Entry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl<T> Eq for Entry<T> {}

impl<T> Ord for Entry<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Higher priority first; among equals, lower sequence (earlier
        // insertion) first.
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl<T> PartialOrd for Entry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Max-priority queue with stable FIFO tie-breaking
pub struct PriorityIntakeQueue<T> {
    heap: BinaryHeap<Entry<T>>,
    next_seq: u64,
}

impl<T> PriorityIntakeQueue<T> {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_seq: 0,
        }
    }

    pub fn enqueue(&mut self, item: T, priority: u8) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Entry {
            priority,
            seq,
            item,
        });
    }

    /// Remove and return the most urgent item, or `None` if empty
    pub fn dequeue(&mut self) -> Option<T> {
        self.heap.pop().map(|entry| entry.item)
    }

    /// Most urgent item without removing it
    pub fn peek(&self) -> Option<&T> {
        self.heap.peek().map(|entry| &entry.item)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }
}

impl<T> Default for PriorityIntakeQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

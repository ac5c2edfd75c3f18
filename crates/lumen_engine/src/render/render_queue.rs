//! # Render Queue
//!
//! Stable priority queue that decides the order renderers are drawn in.
//! Entries come out in ascending render-queue order; entries sharing a
//! render-queue value come out in the order they were pushed.
//!
//! The queue is refilled for every pass (shadow, then 3D) and drained as it
//! is drawn, so it never holds entries across frames.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Render-queue value used by opaque geometry
pub const QUEUE_GEOMETRY: i32 = 2000;
/// Render-queue value used by alpha-blended geometry
pub const QUEUE_TRANSPARENT: i32 = 3000;

#[derive(Debug)]
struct Entry<T> {
    priority: i32,
    sequence: u64,
    item: T,
}

impl<T> PartialEq for Entry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.sequence == other.sequence
    }
}

impl<T> Eq for Entry<T> {}

impl<T> PartialOrd for Entry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Entry<T> {
    // BinaryHeap is a max-heap: reverse both keys so the lowest priority,
    // then the earliest sequence, sits on top
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

/// Min-priority queue with FIFO tie-breaking
#[derive(Debug)]
pub struct RenderQueue<T> {
    heap: BinaryHeap<Entry<T>>,
    next_sequence: u64,
}

impl<T> Default for RenderQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> RenderQueue<T> {
    /// Create an empty queue
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_sequence: 0,
        }
    }

    /// Add an item with the given render-queue value
    pub fn push(&mut self, priority: i32, item: T) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.heap.push(Entry { priority, sequence, item });
    }

    /// Remove the next item to draw
    pub fn pop(&mut self) -> Option<T> {
        self.heap.pop().map(|entry| entry.item)
    }

    /// Render-queue value of the next item
    pub fn peek_priority(&self) -> Option<i32> {
        self.heap.peek().map(|entry| entry.priority)
    }

    /// Number of queued items
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Whether the queue is empty
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Drop all items and restart the sequence counter
    pub fn clear(&mut self) {
        self.heap.clear();
        self.next_sequence = 0;
    }
}

impl<T> Iterator for RenderQueue<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.pop()
    }
}

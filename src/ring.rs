//! Fixed-capacity ring buffers
//!
//! Once full, every append overwrites the oldest element. Readers always get
//! a fresh copy in oldest → newest order, so the buffer itself is never
//! exposed by reference.

use std::collections::VecDeque;

/// Default number of output lines retained per agent
pub const DEFAULT_OUTPUT_CAPACITY: usize = 1000;

/// Ring buffer with overwrite-oldest eviction
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
}

/// Raw output lines for one agent
pub type OutputBuffer = RingBuffer<String>;

impl<T: Clone> RingBuffer<T> {
    /// A zero capacity is bumped to one so the buffer can always hold the latest item.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, item: T) {
        if self.items.len() >= self.capacity {
            self.items.pop_front();
        }
        self.items.push_back(item);
    }

    /// Copy of the contents, oldest first
    pub fn to_vec(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }

    /// Copy of `count` items starting at logical index `start`
    pub fn window(&self, start: usize, count: usize) -> Vec<T> {
        self.items.iter().skip(start).take(count).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl OutputBuffer {
    pub fn append(&mut self, line: impl Into<String>) {
        self.push(line.into());
    }

    pub fn lines(&self) -> Vec<String> {
        self.to_vec()
    }
}

//! Priority queue of suspended acquirers.
//!
//! Waiters are woken highest priority first; ties break FIFO on a stable
//! insertion counter, so equal-priority acquirers are served in arrival
//! order. Priorities are compared with [`f64::total_cmp`].

use std::collections::BinaryHeap;
use std::fmt;

pub(crate) struct WaiterQueue<T> {
    heap: BinaryHeap<Waiter<T>>,
    next_seq: u64,
}

struct Waiter<T> {
    priority: f64,
    seq: u64,
    signal: T,
}

impl<T> PartialEq for Waiter<T> {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq && self.priority.total_cmp(&other.priority).is_eq()
    }
}

impl<T> Eq for Waiter<T> {}

impl<T> PartialOrd for Waiter<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Waiter<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Max-heap: larger priority wins, then the earlier insertion.
        self.priority
            .total_cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl<T> WaiterQueue<T> {
    pub(crate) fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_seq: 0,
        }
    }

    pub(crate) fn push(&mut self, priority: f64, signal: T) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Waiter {
            priority,
            seq,
            signal,
        });
    }

    pub(crate) fn pop(&mut self) -> Option<T> {
        self.heap.pop().map(|w| w.signal)
    }

    pub(crate) fn len(&self) -> usize {
        self.heap.len()
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

impl<T> fmt::Debug for WaiterQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WaiterQueue")
            .field("len", &self.heap.len())
            .finish()
    }
}

//! Bounded blocking FIFO between CSV producers and the matrix writer.
//!
//! A fixed-capacity ring: `push` blocks while the queue is full and
//! `pop` blocks while it is empty, which is what throttles CSV reading
//! to the rate the writer can sustain. Shutdown is an explicit
//! sentinel item pushed by the coordinator after all producers have
//! joined (the queue itself carries `Option<T>` in that setup and the
//! sentinel is `None`).

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::Duration;

pub struct WorkQueue<T> {
    items: Mutex<VecDeque<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
}

impl<T> WorkQueue<T> {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "queue capacity must be positive");
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity,
        }
    }

    /// Enqueue, blocking while the queue is full.
    pub fn push(&self, item: T) {
        let mut items = self.items.lock().unwrap();
        while items.len() >= self.capacity {
            items = self.not_full.wait(items).unwrap();
        }
        items.push_back(item);
        self.not_empty.notify_one();
    }

    /// Dequeue, blocking while the queue is empty.
    pub fn pop(&self) -> T {
        let mut items = self.items.lock().unwrap();
        while items.is_empty() {
            items = self.not_empty.wait(items).unwrap();
        }
        let item = items.pop_front().unwrap();
        self.not_full.notify_one();
        item
    }

    /// Dequeue with a timeout; `None` when nothing arrived in time.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<T> {
        let mut items = self.items.lock().unwrap();
        while items.is_empty() {
            let (guard, result) = self.not_empty.wait_timeout(items, timeout).unwrap();
            items = guard;
            if result.timed_out() && items.is_empty() {
                return None;
            }
        }
        let item = items.pop_front().unwrap();
        self.not_full.notify_one();
        Some(item)
    }

    pub fn len(&self) -> usize {
        self.items.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

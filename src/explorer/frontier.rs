//! Shared work queue of the exploration workers.
//!
//! Workers pop items, expand them and push what they discover. The run is
//! over once the queue is empty and no item is being expanded.
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Condvar, Mutex};

#[derive(Debug)]
struct Queue<T> {
    items: VecDeque<T>,
    in_flight: usize,
}

#[derive(Debug)]
pub struct Frontier<T> {
    queue: Mutex<Queue<T>>,
    ready: Condvar,
    cancelled: AtomicBool,
}

impl<T> Frontier<T> {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(Queue {
                items: VecDeque::new(),
                in_flight: 0,
            }),
            ready: Condvar::new(),
            cancelled: AtomicBool::new(false),
        }
    }

    pub fn push(&self, item: T) {
        self.queue.lock().items.push_back(item);
        self.ready.notify_one();
    }

    /// Next item in FIFO order, blocking while other workers may still
    /// produce some. `None` once the run is quiescent or cancelled.
    ///
    /// Every returned item must be acknowledged with [`Frontier::done`].
    pub fn next(&self) -> Option<T> {
        let mut queue = self.queue.lock();
        loop {
            if self.is_cancelled() {
                return None;
            }
            if let Some(item) = queue.items.pop_front() {
                queue.in_flight += 1;
                return Some(item);
            }
            if queue.in_flight == 0 {
                self.ready.notify_all();
                return None;
            }
            self.ready.wait(&mut queue);
        }
    }

    pub fn done(&self) {
        let mut queue = self.queue.lock();
        queue.in_flight = queue.in_flight.saturating_sub(1);
        if queue.in_flight == 0 && queue.items.is_empty() {
            self.ready.notify_all();
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        let _queue = self.queue.lock();
        self.ready.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.queue.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for Frontier<T> {
    fn default() -> Self {
        Self::new()
    }
}

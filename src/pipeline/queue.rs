use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

/// Capacity of the ingestion queue.
pub const INGEST_QUEUE_CAPACITY: usize = 20;

/// FIFO handoff between stages.
///
/// The capacity is advisory: `push` never blocks or fails. Producers consult
/// `has_room` to pace themselves. Consumers poll with `try_pop`.
#[derive(Debug)]
pub struct BoundedQueue<T> {
    items: Mutex<VecDeque<T>>,
    capacity: usize,
}

impl<T> BoundedQueue<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
        }
    }

    /// Queue with no meaningful capacity hint.
    pub fn unbounded() -> Self {
        Self::new(usize::MAX)
    }

    pub fn push(&self, item: T) {
        self.lock().push_back(item);
    }

    /// Append a batch contiguously; no other producer's items interleave with it.
    pub fn push_all<I: IntoIterator<Item = T>>(&self, items: I) {
        self.lock().extend(items);
    }

    pub fn try_pop(&self) -> Option<T> {
        self.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// True while the queue holds fewer items than its advisory capacity.
    pub fn has_room(&self) -> bool {
        self.len() < self.capacity
    }

    // A panic while holding the lock cannot leave the deque half-modified.
    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        self.items.lock().unwrap_or_else(|e| e.into_inner())
    }
}

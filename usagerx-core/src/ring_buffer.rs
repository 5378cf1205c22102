//! Bounded FIFO shared between the network listener and the dispatch loop.
//!
//! One mutex guards the slot array and the head/tail/count indices, so every
//! operation observes a single consistent snapshot. Producers never block:
//! `insert` on a full buffer returns `false` and the caller counts the drop.
//! Consumers can either poll with `remove_next` or park on a condition
//! variable with `remove_next_timeout`, which `close` wakes at shutdown.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::QueueError;

struct Slots<T> {
    items: Box<[Option<T>]>,
    head: usize,
    tail: usize,
    count: usize,
    closed: bool,
}

impl<T> Slots<T> {
    #[inline]
    fn push(&mut self, item: T) -> bool {
        if self.count == self.items.len() {
            return false;
        }
        self.items[self.tail] = Some(item);
        self.tail = (self.tail + 1) % self.items.len();
        self.count += 1;
        true
    }

    #[inline]
    fn pop(&mut self) -> Option<T> {
        if self.count == 0 {
            return None;
        }
        // take() leaves the slot empty so no reference outlives removal
        let item = self.items[self.head].take();
        self.head = (self.head + 1) % self.items.len();
        self.count -= 1;
        item
    }
}

/// Fixed-capacity, thread-safe ring buffer.
pub struct RingBuffer<T> {
    slots: Mutex<Slots<T>>,
    not_empty: Condvar,
    capacity: usize,
}

impl<T> RingBuffer<T> {
    /// Creates a ring buffer holding at most `capacity` items.
    pub fn with_capacity(capacity: usize) -> Result<Self, QueueError> {
        if capacity == 0 {
            return Err(QueueError::InvalidCapacity(capacity));
        }

        let items = (0..capacity)
            .map(|_| None)
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Ok(Self {
            slots: Mutex::new(Slots {
                items,
                head: 0,
                tail: 0,
                count: 0,
                closed: false,
            }),
            not_empty: Condvar::new(),
            capacity,
        })
    }

    /// Appends `item` unless the buffer is full.
    ///
    /// Returns `false` without blocking when at capacity; the item is dropped
    /// and the buffer is left untouched.
    #[inline]
    pub fn insert(&self, item: T) -> bool {
        let inserted = self.slots.lock().push(item);
        if inserted {
            self.not_empty.notify_one();
        }
        inserted
    }

    /// Removes and returns the oldest item, or `None` if currently empty.
    #[inline]
    pub fn remove_next(&self) -> Option<T> {
        self.slots.lock().pop()
    }

    /// Removes the oldest item, waiting up to `timeout` for one to arrive.
    ///
    /// Returns `None` when the timeout elapses or when the buffer has been
    /// closed and is empty. A closed buffer still hands out queued items.
    pub fn remove_next_timeout(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now().checked_add(timeout);
        let mut slots = self.slots.lock();
        loop {
            if let Some(item) = slots.pop() {
                return Some(item);
            }
            if slots.closed {
                return None;
            }
            match deadline {
                Some(deadline) => {
                    if self.not_empty.wait_until(&mut slots, deadline).timed_out() {
                        return slots.pop();
                    }
                }
                None => self.not_empty.wait(&mut slots),
            }
        }
    }

    /// Marks the buffer closed and wakes every blocked consumer.
    pub fn close(&self) {
        self.slots.lock().closed = true;
        self.not_empty.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.slots.lock().closed
    }

    pub fn size(&self) -> usize {
        self.slots.lock().count
    }

    pub fn is_full(&self) -> bool {
        self.slots.lock().count == self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.slots.lock().count == 0
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<T> std::fmt::Debug for RingBuffer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let slots = self.slots.lock();
        f.debug_struct("RingBuffer")
            .field("capacity", &self.capacity)
            .field("count", &slots.count)
            .field("head", &slots.head)
            .field("tail", &slots.tail)
            .field("closed", &slots.closed)
            .finish()
    }
}

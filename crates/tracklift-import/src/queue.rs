//! Bounded per-track sample queue.
//!
//! A [`SampleQueue`] sits between the import worker (single producer) and the
//! host (any number of consumers, serialized by the queue lock). Pushing into
//! a full queue blocks, popping from an empty queue blocks until a record
//! arrives or the queue is sealed. Once sealed and drained, [`SampleQueue::pop`]
//! returns `None` forever.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracklift_core::SampleRecord;

/// A record that could not be pushed, handed back to the caller.
#[derive(Debug, Error)]
pub enum PushError {
    #[error("queue is full")]
    Full(SampleRecord),
    #[error("queue is sealed")]
    Sealed(SampleRecord),
}

impl PushError {
    /// Recover the rejected record.
    pub fn into_inner(self) -> SampleRecord {
        match self {
            Self::Full(record) | Self::Sealed(record) => record,
        }
    }
}

#[derive(Debug, Default)]
struct QueueState {
    records: VecDeque<SampleRecord>,
    sealed: bool,
    pushed: u64,
}

/// Bounded FIFO of [`SampleRecord`]s for one track.
#[derive(Debug)]
pub struct SampleQueue {
    state: Mutex<QueueState>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
    /// Shared with the worker so it can sleep until any of its queues drains.
    wakeup: Option<Arc<Wakeup>>,
}

impl SampleQueue {
    /// Create a queue holding at most `capacity` records (minimum 1).
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState {
                records: VecDeque::with_capacity(capacity.max(1)),
                ..Default::default()
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity: capacity.max(1),
            wakeup: None,
        }
    }

    pub(crate) fn with_wakeup(capacity: usize, wakeup: Arc<Wakeup>) -> Self {
        Self {
            wakeup: Some(wakeup),
            ..Self::new(capacity)
        }
    }

    /// Append a record, blocking while the queue is full.
    ///
    /// Fails with [`PushError::Sealed`] if the queue is sealed before space
    /// becomes available.
    pub fn push(&self, record: SampleRecord) -> Result<(), PushError> {
        let mut state = self.state.lock();
        while state.records.len() >= self.capacity && !state.sealed {
            self.not_full.wait(&mut state);
        }
        if state.sealed {
            return Err(PushError::Sealed(record));
        }
        self.enqueue(&mut state, record);
        Ok(())
    }

    /// Append a record without blocking.
    pub fn try_push(&self, record: SampleRecord) -> Result<(), PushError> {
        let mut state = self.state.lock();
        if state.sealed {
            return Err(PushError::Sealed(record));
        }
        if state.records.len() >= self.capacity {
            return Err(PushError::Full(record));
        }
        self.enqueue(&mut state, record);
        Ok(())
    }

    fn enqueue(&self, state: &mut QueueState, record: SampleRecord) {
        state.records.push_back(record);
        state.pushed += 1;
        self.not_empty.notify_one();
    }

    /// Remove the oldest record, blocking while the queue is empty and open.
    ///
    /// Returns `None` once the queue is sealed and drained.
    pub fn pop(&self) -> Option<SampleRecord> {
        let mut state = self.state.lock();
        loop {
            if let Some(record) = self.dequeue(&mut state) {
                return Some(record);
            }
            if state.sealed {
                return None;
            }
            self.not_empty.wait(&mut state);
        }
    }

    /// Remove the oldest record, waiting at most `timeout` for one to arrive.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<SampleRecord> {
        let mut state = self.state.lock();
        if let Some(record) = self.dequeue(&mut state) {
            return Some(record);
        }
        if !state.sealed {
            self.not_empty.wait_for(&mut state, timeout);
        }
        self.dequeue(&mut state)
    }

    /// Remove the oldest record without blocking.
    pub fn try_pop(&self) -> Option<SampleRecord> {
        let mut state = self.state.lock();
        self.dequeue(&mut state)
    }

    fn dequeue(&self, state: &mut QueueState) -> Option<SampleRecord> {
        let record = state.records.pop_front()?;
        self.not_full.notify_one();
        if let Some(wakeup) = &self.wakeup {
            wakeup.notify();
        }
        Some(record)
    }

    /// Stop accepting records and wake every blocked producer and consumer.
    pub fn seal(&self) {
        let mut state = self.state.lock();
        state.sealed = true;
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    /// Drop every buffered record. Returns how many were discarded.
    pub fn clear(&self) -> usize {
        let mut state = self.state.lock();
        let dropped = state.records.len();
        state.records.clear();
        self.not_full.notify_all();
        if let Some(wakeup) = &self.wakeup {
            wakeup.notify();
        }
        dropped
    }

    pub fn len(&self) -> usize {
        self.state.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity
    }

    pub fn is_sealed(&self) -> bool {
        self.state.lock().sealed
    }

    /// Sealed with nothing left to pop.
    pub fn is_drained(&self) -> bool {
        let state = self.state.lock();
        state.sealed && state.records.is_empty()
    }

    /// Number of records ever accepted by this queue.
    pub fn pushed_total(&self) -> u64 {
        self.state.lock().pushed
    }
}

/// Generation counter the worker sleeps on while every queue is full.
///
/// Readers take the generation before checking their condition and then wait
/// for it to move, so a notification between the check and the wait is never
/// lost.
#[derive(Debug, Default)]
pub(crate) struct Wakeup {
    generation: Mutex<u64>,
    cond: Condvar,
}

impl Wakeup {
    pub(crate) fn current(&self) -> u64 {
        *self.generation.lock()
    }

    pub(crate) fn notify(&self) {
        let mut generation = self.generation.lock();
        *generation = generation.wrapping_add(1);
        self.cond.notify_all();
    }

    /// Block until the generation differs from `seen`.
    pub(crate) fn wait_past(&self, seen: u64) {
        let mut generation = self.generation.lock();
        while *generation == seen {
            self.cond.wait(&mut generation);
        }
    }
}

//! Bounded, blocking, timestamp-ordered queue.
//!
//! Entries are keyed by `(timestamp, sequence)` where `sequence` is a
//! per-queue insertion counter, so equal timestamps come out in the order
//! they went in. A single mutex guards the ordered store, the capacity and
//! the closed flag together; two condition variables wake blocked
//! dequeuers (`not_empty`) and blocked enqueuers (`not_full`).
//!
//! Closing never fails an operation with an error. Blocked and subsequent
//! calls return `None` / [`EnqueueOutcome::Closed`] instead, and entries still
//! resident stay in the queue until they are drained or the queue reopens.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Result of an enqueue attempt. The rejected value is handed back.
#[derive(Debug, PartialEq, Eq)]
pub enum EnqueueOutcome<T> {
    Inserted,
    /// Capacity stayed exhausted until the timeout elapsed.
    Full(T),
    /// The queue was closed before or while waiting for room.
    Closed(T),
}

impl<T> EnqueueOutcome<T> {
    pub fn is_inserted(&self) -> bool {
        matches!(self, EnqueueOutcome::Inserted)
    }

    /// The value that was not inserted, if any.
    pub fn into_rejected(self) -> Option<T> {
        match self {
            EnqueueOutcome::Inserted => None,
            EnqueueOutcome::Full(value) | EnqueueOutcome::Closed(value) => Some(value),
        }
    }
}

type Key = (u64, u64);

struct State<T> {
    entries: BTreeMap<Key, T>,
    next_seq: u64,
    max_size: Option<usize>,
    closed: bool,
}

impl<T> State<T> {
    fn has_room(&self) -> bool {
        self.max_size.map_or(true, |max| self.entries.len() < max)
    }
}

pub struct PriorityQueue<T> {
    state: Mutex<State<T>>,
    not_empty: Condvar,
    not_full: Condvar,
}

impl<T> PriorityQueue<T> {
    /// Create an open queue. `None` means unbounded.
    pub fn new(max_size: Option<usize>) -> Self {
        Self::with_closed(max_size, false)
    }

    /// Create a queue that rejects every operation until [`open`](Self::open).
    pub fn new_closed(max_size: Option<usize>) -> Self {
        Self::with_closed(max_size, true)
    }

    fn with_closed(max_size: Option<usize>, closed: bool) -> Self {
        Self {
            state: Mutex::new(State {
                entries: BTreeMap::new(),
                next_seq: 0,
                max_size: normalize_capacity(max_size),
                closed,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
        }
    }

    /// Insert `value` ordered by `timestamp`, blocking while the queue is full.
    ///
    /// `force` skips the capacity check; it never blocks. Returns
    /// [`EnqueueOutcome::Closed`] if the queue is closed, including while the
    /// caller is waiting for room.
    pub fn enqueue(&self, timestamp: u64, value: T, force: bool) -> EnqueueOutcome<T> {
        self.insert(timestamp, value, force, None)
    }

    /// Insert `value`, waiting at most `timeout` for room.
    ///
    /// `None` waits indefinitely; `Some(Duration::ZERO)` fails fast.
    pub fn enqueue_timeout(
        &self,
        timestamp: u64,
        value: T,
        timeout: Option<Duration>,
    ) -> EnqueueOutcome<T> {
        // A timeout too large to represent waits like no timeout at all.
        let deadline = timeout.and_then(|timeout| Instant::now().checked_add(timeout));
        self.insert(timestamp, value, false, deadline)
    }

    fn insert(
        &self,
        timestamp: u64,
        value: T,
        force: bool,
        deadline: Option<Instant>,
    ) -> EnqueueOutcome<T> {
        let mut state = self.lock();
        loop {
            if state.closed {
                return EnqueueOutcome::Closed(value);
            }
            if force || state.has_room() {
                break;
            }
            state = match deadline {
                None => self
                    .not_full
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return EnqueueOutcome::Full(value);
                    }
                    self.not_full
                        .wait_timeout(state, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
        }

        let seq = state.next_seq;
        state.next_seq = state.next_seq.wrapping_add(1);
        state.entries.insert((timestamp, seq), value);
        drop(state);
        self.not_empty.notify_all();
        EnqueueOutcome::Inserted
    }

    /// Remove and return the lowest-timestamp entry, blocking until one exists.
    ///
    /// Returns `None` as soon as the queue is closed, without draining.
    pub fn dequeue(&self) -> Option<(u64, T)> {
        let state = self.wait_for_entry(None)?;
        self.pop_front(state)
    }

    /// Like [`dequeue`](Self::dequeue) but gives up after `timeout`.
    pub fn dequeue_timeout(&self, timeout: Duration) -> Option<(u64, T)> {
        let deadline = Instant::now().checked_add(timeout);
        let state = self.wait_for_entry(deadline)?;
        self.pop_front(state)
    }

    /// The lowest-timestamp entry without removing it. Blocks like `dequeue`.
    pub fn peek(&self) -> Option<(u64, T)>
    where
        T: Clone,
    {
        let state = self.wait_for_entry(None)?;
        state
            .entries
            .first_key_value()
            .map(|(&(timestamp, _), value)| (timestamp, value.clone()))
    }

    fn pop_front(&self, mut state: MutexGuard<'_, State<T>>) -> Option<(u64, T)> {
        let ((timestamp, _), value) = state.entries.pop_first()?;
        drop(state);
        self.not_full.notify_all();
        Some((timestamp, value))
    }

    // Returns the guard with at least one entry present, or None if the queue
    // closed or the deadline passed first.
    fn wait_for_entry(&self, deadline: Option<Instant>) -> Option<MutexGuard<'_, State<T>>> {
        let mut state = self.lock();
        loop {
            if state.closed {
                return None;
            }
            if !state.entries.is_empty() {
                return Some(state);
            }
            state = match deadline {
                None => self
                    .not_empty
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return None;
                    }
                    self.not_empty
                        .wait_timeout(state, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
        }
    }

    /// Atomically remove every entry whose value matches `predicate`.
    ///
    /// The scan and the removal happen under one lock acquisition, so no
    /// concurrent enqueue or dequeue observes a partially cleared queue.
    /// Removed entries are returned in delivery order.
    pub fn remove_where<F>(&self, mut predicate: F) -> Vec<(u64, T)>
    where
        F: FnMut(&T) -> bool,
    {
        let mut state = self.lock();
        let keys: Vec<Key> = state
            .entries
            .iter()
            .filter(|(_, value)| predicate(value))
            .map(|(key, _)| *key)
            .collect();
        let removed: Vec<(u64, T)> = keys
            .into_iter()
            .filter_map(|key| state.entries.remove_entry(&key))
            .map(|((timestamp, _), value)| (timestamp, value))
            .collect();
        drop(state);
        if !removed.is_empty() {
            self.not_full.notify_all();
        }
        removed
    }

    /// Remove and return every entry in delivery order.
    pub fn drain(&self) -> Vec<(u64, T)> {
        let mut state = self.lock();
        let removed = take_all(&mut state);
        drop(state);
        self.not_full.notify_all();
        removed
    }

    /// Close the queue and remove every resident entry under one lock.
    pub fn close_and_drain(&self) -> Vec<(u64, T)> {
        let mut state = self.lock();
        state.closed = true;
        let removed = take_all(&mut state);
        drop(state);
        self.wake_all();
        removed
    }

    pub fn open(&self) {
        self.lock().closed = false;
        self.wake_all();
    }

    /// Close the queue and wake every blocked caller so it can return.
    pub fn close(&self) {
        self.lock().closed = true;
        self.wake_all();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    pub fn max_size(&self) -> Option<usize> {
        self.lock().max_size
    }

    /// Change the capacity and let blocked enqueuers re-check for room.
    ///
    /// A capacity of zero is treated as one.
    pub fn set_max_size(&self, max_size: Option<usize>) {
        self.lock().max_size = normalize_capacity(max_size);
        self.not_full.notify_all();
    }

    fn wake_all(&self) {
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    // The state stays consistent even if a predicate panicked mid-scan, since
    // removal only starts after the scan completes.
    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> Default for PriorityQueue<T> {
    fn default() -> Self {
        Self::new(None)
    }
}

impl<T> fmt::Debug for PriorityQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("PriorityQueue")
            .field("len", &state.entries.len())
            .field("max_size", &state.max_size)
            .field("closed", &state.closed)
            .finish()
    }
}

fn take_all<T>(state: &mut State<T>) -> Vec<(u64, T)> {
    std::mem::take(&mut state.entries)
        .into_iter()
        .map(|((timestamp, _), value)| (timestamp, value))
        .collect()
}

fn normalize_capacity(max_size: Option<usize>) -> Option<usize> {
    max_size.map(|max| max.max(1))
}

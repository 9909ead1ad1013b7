//! Live message accounting for backlog and leak detection.
//!
//! A tracker sees every message when it enters a channel's queue (`add`) and
//! when it leaves it by delivery, clear or close (`remove`). It is purely
//! observational; channels behave identically with [`NoopTracker`].

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, OnceLock};

use crate::message::{Message, MessageKind};

pub trait MessageTracker: Send + Sync {
    fn add(&self, message: &Message);
    fn remove(&self, message: &Message);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTracker;

impl MessageTracker for NoopTracker {
    fn add(&self, _message: &Message) {}
    fn remove(&self, _message: &Message) {}
}

impl<T: MessageTracker + ?Sized> MessageTracker for Arc<T> {
    fn add(&self, message: &Message) {
        (**self).add(message);
    }

    fn remove(&self, message: &Message) {
        (**self).remove(message);
    }
}

/// Per-kind live counts, safe to share across any number of channels.
#[derive(Debug, Default)]
pub struct CountingTracker {
    live: [AtomicI64; MessageKind::ALL.len()],
}

/// Point-in-time copy of a [`CountingTracker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TrackerSnapshot {
    pub execution: i64,
    pub quote_change: i64,
    pub level1_change: i64,
    pub other: i64,
}

impl TrackerSnapshot {
    pub fn total(&self) -> i64 {
        self.execution + self.quote_change + self.level1_change + self.other
    }
}

impl CountingTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide tracker shared by every channel that opts into it.
    pub fn global() -> Arc<CountingTracker> {
        static GLOBAL: OnceLock<Arc<CountingTracker>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(CountingTracker::new())))
    }

    pub fn live(&self, kind: MessageKind) -> i64 {
        self.live[kind.index()].load(Ordering::Acquire)
    }

    pub fn total_live(&self) -> i64 {
        self.live.iter().map(|count| count.load(Ordering::Acquire)).sum()
    }

    pub fn snapshot(&self) -> TrackerSnapshot {
        TrackerSnapshot {
            execution: self.live(MessageKind::Execution),
            quote_change: self.live(MessageKind::QuoteChange),
            level1_change: self.live(MessageKind::Level1Change),
            other: self.live(MessageKind::Other),
        }
    }
}

impl MessageTracker for CountingTracker {
    fn add(&self, message: &Message) {
        self.live[message.kind().index()].fetch_add(1, Ordering::AcqRel);
    }

    fn remove(&self, message: &Message) {
        self.live[message.kind().index()].fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{ExecutionKind, Payload};
    use std::thread;

    #[test]
    fn counts_per_kind() {
        let tracker = CountingTracker::new();
        let exec = Message::new(1, Payload::execution("A", ExecutionKind::Order, Vec::new()));
        let quote = Message::new(2, Payload::quote_change("A", Vec::new()));

        tracker.add(&exec);
        tracker.add(&exec);
        tracker.add(&quote);
        tracker.remove(&exec);

        assert_eq!(tracker.live(MessageKind::Execution), 1);
        assert_eq!(tracker.live(MessageKind::QuoteChange), 1);
        assert_eq!(tracker.snapshot().total(), 2);
        assert_eq!(tracker.total_live(), 2);
    }

    #[test]
    fn concurrent_updates_balance_out() {
        let tracker = Arc::new(CountingTracker::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let tracker = Arc::clone(&tracker);
                thread::spawn(move || {
                    let msg = Message::new(0, Payload::other(1, Vec::new()));
                    for _ in 0..1_000 {
                        tracker.add(&msg);
                        tracker.remove(&msg);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(tracker.total_live(), 0);
    }

    #[test]
    fn global_tracker_is_shared() {
        assert!(Arc::ptr_eq(&CountingTracker::global(), &CountingTracker::global()));
    }
}

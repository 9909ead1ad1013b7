//! Delivery statistics for a channel.

use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of a channel's counters since construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelStats {
    /// Messages accepted into the queue.
    pub sent: u64,

    /// Messages handed to subscribers.
    pub delivered: u64,

    /// Messages removed by clear requests.
    pub purged: u64,

    /// Messages still pending when the channel was closed.
    pub discarded: u64,

    /// Subscriber errors and panics reported to the error handler.
    pub callback_failures: u64,
}

impl ChannelStats {
    /// Messages accepted but not yet delivered, purged or discarded.
    pub fn in_flight(&self) -> u64 {
        self.sent
            .saturating_sub(self.delivered + self.purged + self.discarded)
    }

    pub fn summary(&self) -> String {
        format!(
            "Sent: {}, Delivered: {}, Purged: {}, Discarded: {}, Callback failures: {}",
            self.sent, self.delivered, self.purged, self.discarded, self.callback_failures
        )
    }
}

#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    sent: AtomicU64,
    delivered: AtomicU64,
    purged: AtomicU64,
    discarded: AtomicU64,
    callback_failures: AtomicU64,
}

impl StatsCounters {
    pub(crate) fn record_sent(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_purged(&self, count: usize) {
        self.purged.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_discarded(&self, count: usize) {
        self.discarded.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_callback_failure(&self) {
        self.callback_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> ChannelStats {
        ChannelStats {
            sent: self.sent.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            purged: self.purged.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            callback_failures: self.callback_failures.load(Ordering::Relaxed),
        }
    }
}

//! Single-consumer, timestamp-ordered message channel.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────┐
//! │ Producer A │──┐
//! └────────────┘  │  send()   ┌───────────────┐  dequeue  ┌─────────────────┐
//!                 ├──────────►│ PriorityQueue │──────────►│ delivery worker │──► subscribers
//! ┌────────────┐  │           └───────────────┘           └─────────────────┘
//! │ Producer B │──┘                  ▲
//! └────────────┘                     │ remove_where
//!        │  send(ClearQueue) ────────┘
//! ```
//!
//! Exactly one delivery thread runs per open channel. It dequeues the
//! lowest-timestamp message, invokes every subscriber inline, and routes
//! subscriber failures to the configured [`ErrorHandler`]. Clear requests are
//! executed synchronously by the sender and never reach the queue.
//!
//! # Lifecycle
//!
//! A channel is built closed. [`Channel::open`] starts the worker; opening an
//! open channel is a no-op. [`Channel::close`] discards every pending message
//! and unblocks the worker, which fires the `on_closed` listeners once and
//! exits. The channel may be reopened afterwards.
//!
//! A worker only exits after deciding, under the lifecycle lock, that the
//! queue is still closed. Reopening before that point (for instance from a
//! subscriber callback) hands the reopened queue to the same worker, so
//! callbacks never run on two threads at once.

mod config;
mod handler;
mod stats;
mod worker;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use log::{debug, info, warn};

use crate::core::{EnqueueOutcome, Error, PriorityQueue, Result};
use crate::message::{ClearQueueRequest, Message, Payload};
use crate::tracker::MessageTracker;

pub use config::{BackpressurePolicy, ChannelBuilder, ChannelConfig};
pub use handler::{DeliveryError, ErrorHandler, LogErrorHandler};
pub use stats::ChannelStats;

use stats::StatsCounters;

type MessageCallback = Arc<dyn Fn(&Message) -> anyhow::Result<()> + Send + Sync>;
type ClosedCallback = Arc<dyn Fn() + Send + Sync>;

/// What happened to a message handed to [`Channel::send`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Enqueued for delivery.
    Queued,
    /// A clear request ran and removed this many pending messages.
    Cleared { removed: usize },
    /// The channel closed while the sender was waiting for room.
    NotQueued,
}

// Copy-on-write listener list; the worker snapshots it per message so a
// callback may subscribe without deadlocking.
struct Listeners<F: ?Sized> {
    list: Mutex<Arc<Vec<Arc<F>>>>,
}

impl<F: ?Sized> Listeners<F> {
    fn new() -> Self {
        Self {
            list: Mutex::new(Arc::new(Vec::new())),
        }
    }

    fn push(&self, listener: Arc<F>) {
        let mut list = self.list.lock().unwrap_or_else(PoisonError::into_inner);
        let mut next = Vec::clone(&list);
        next.push(listener);
        *list = Arc::new(next);
    }

    fn snapshot(&self) -> Arc<Vec<Arc<F>>> {
        Arc::clone(&self.list.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

pub(crate) struct Inner {
    name: String,
    config: ChannelConfig,
    queue: PriorityQueue<Message>,
    // Open-to-closed transitions so far; the worker fires `on_closed` once per step.
    closes: AtomicU64,
    lifecycle: Mutex<Lifecycle>,
    tracker: Arc<dyn MessageTracker>,
    error_handler: Arc<dyn ErrorHandler>,
    on_message: Listeners<dyn Fn(&Message) -> anyhow::Result<()> + Send + Sync>,
    on_closed: Listeners<dyn Fn() + Send + Sync>,
    stats: StatsCounters,
}

#[derive(Default)]
struct Lifecycle {
    // Cleared by the worker, under this lock, once it has committed to exit.
    running: bool,
    handle: Option<JoinHandle<()>>,
}

impl Inner {
    fn lock_lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn clear(&self, request: &ClearQueueRequest) -> usize {
        let removed = self.queue.remove_where(|message| request.matches(message));
        for (_, message) in &removed {
            self.tracker.remove(message);
        }
        self.stats.record_purged(removed.len());
        debug!(
            "channel {} cleared {} pending messages (target={:?}, instrument={:?}, execution_kind={:?})",
            self.name,
            removed.len(),
            request.target,
            request.instrument,
            request.execution_kind
        );
        removed.len()
    }

    fn discard_pending(&self) -> usize {
        let discarded = self.queue.close_and_drain();
        for (_, message) in &discarded {
            self.tracker.remove(message);
        }
        self.stats.record_discarded(discarded.len());
        discarded.len()
    }
}

pub struct Channel {
    inner: Arc<Inner>,
}

impl Channel {
    /// Unbounded channel with the given name and error handler.
    pub fn new(name: impl Into<String>, error_handler: impl ErrorHandler + 'static) -> Result<Self> {
        ChannelBuilder::new(name).error_handler(error_handler).build()
    }

    pub fn builder(name: impl Into<String>) -> ChannelBuilder {
        ChannelBuilder::new(name)
    }

    pub(crate) fn from_parts(
        config: ChannelConfig,
        error_handler: Arc<dyn ErrorHandler>,
        tracker: Arc<dyn MessageTracker>,
    ) -> Self {
        let inner = Inner {
            name: config.name.clone(),
            queue: PriorityQueue::new_closed(config.max_message_count),
            config,
            closes: AtomicU64::new(0),
            lifecycle: Mutex::new(Lifecycle::default()),
            tracker,
            error_handler,
            on_message: Listeners::new(),
            on_closed: Listeners::new(),
            stats: StatsCounters::default(),
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Open the queue and start the delivery worker. No-op if already open.
    ///
    /// If the worker from the previous open has not exited yet, it keeps
    /// delivering for this open instead of a second thread being started.
    /// Never waits on a running worker, so it is safe to call from a
    /// subscriber callback.
    pub fn open(&self) -> Result<()> {
        let mut lifecycle = self.inner.lock_lifecycle();
        if !self.inner.queue.is_closed() {
            debug!("channel {} already open", self.inner.name);
            return Ok(());
        }

        self.inner.queue.open();
        if lifecycle.running {
            info!(
                "channel {} reopened on its running delivery worker",
                self.inner.name
            );
            return Ok(());
        }

        // Past its exit decision; it never takes the lifecycle lock again.
        if let Some(previous) = lifecycle.handle.take() {
            join_unless_current(previous);
        }

        let inner = Arc::clone(&self.inner);
        let seen_closes = self.inner.closes.load(Ordering::Acquire);
        let handle = thread::Builder::new()
            .name(self.inner.config.delivery_thread_name())
            .spawn(move || worker::run(inner, seen_closes))
            .map_err(|err| {
                self.inner.queue.close();
                Error::Spawn(err)
            })?;
        lifecycle.running = true;
        lifecycle.handle = Some(handle);

        info!(
            "channel {} opened (max_message_count={:?})",
            self.inner.name,
            self.inner.queue.max_size()
        );
        Ok(())
    }

    /// Close the channel and discard every pending message.
    ///
    /// Returns immediately; the worker fires `on_closed` once it observes the
    /// close, which may be after a subscriber callback in progress returns.
    pub fn close(&self) {
        let discarded = {
            let _lifecycle = self.inner.lock_lifecycle();
            let was_open = !self.inner.queue.is_closed();
            if was_open {
                self.inner.closes.fetch_add(1, Ordering::AcqRel);
            }
            let discarded = self.inner.discard_pending();
            if !was_open && discarded == 0 {
                return;
            }
            discarded
        };
        info!(
            "channel {} closed ({} pending messages discarded)",
            self.inner.name, discarded
        );
    }

    pub fn is_open(&self) -> bool {
        !self.inner.queue.is_closed()
    }

    /// Send a message, or run it immediately if it is a clear request.
    ///
    /// May block when the channel is bounded and full, per the configured
    /// [`BackpressurePolicy`].
    pub fn send(&self, message: Message) -> Result<SendOutcome> {
        self.send_with(message, self.inner.config.backpressure)
    }

    /// Send without waiting for room, whatever the configured policy.
    pub fn try_send(&self, message: Message) -> Result<SendOutcome> {
        self.send_with(message, BackpressurePolicy::FailFast)
    }

    fn send_with(&self, message: Message, policy: BackpressurePolicy) -> Result<SendOutcome> {
        if self.inner.queue.is_closed() {
            return Err(Error::NotOpen {
                channel: self.inner.name.clone(),
            });
        }

        if let Payload::ClearQueue(request) = &message.payload {
            let removed = self.inner.clear(request);
            return Ok(SendOutcome::Cleared { removed });
        }

        // Count before inserting so the worker can never decrement first.
        self.inner.tracker.add(&message);
        let timestamp = message.timestamp_ns;
        match self
            .inner
            .queue
            .enqueue_timeout(timestamp, message, policy.timeout())
        {
            EnqueueOutcome::Inserted => {
                self.inner.stats.record_sent();
                Ok(SendOutcome::Queued)
            }
            EnqueueOutcome::Full(message) => {
                self.inner.tracker.remove(&message);
                Err(Error::QueueFull)
            }
            EnqueueOutcome::Closed(message) => {
                self.inner.tracker.remove(&message);
                warn!(
                    "channel {} closed before {} message at {} was queued",
                    self.inner.name,
                    message.kind(),
                    timestamp
                );
                Ok(SendOutcome::NotQueued)
            }
        }
    }

    /// Messages currently pending delivery.
    pub fn message_count(&self) -> usize {
        self.inner.queue.len()
    }

    /// `None` means unbounded.
    pub fn max_message_count(&self) -> Option<usize> {
        self.inner.queue.max_size()
    }

    /// Change the capacity; blocked senders re-check for room.
    pub fn set_max_message_count(&self, max_message_count: Option<usize>) {
        self.inner.queue.set_max_size(max_message_count);
    }

    /// Register a callback invoked on the delivery thread for every message,
    /// in delivery order.
    pub fn subscribe<F>(&self, callback: F)
    where
        F: Fn(&Message) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let callback: MessageCallback = Arc::new(callback);
        self.inner.on_message.push(callback);
    }

    /// Register a callback invoked on the delivery thread once per close,
    /// after any callback in progress at the time of the close returns.
    pub fn on_closed<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        let callback: ClosedCallback = Arc::new(callback);
        self.inner.on_closed.push(callback);
    }

    pub fn stats(&self) -> ChannelStats {
        self.inner.stats.snapshot()
    }

}

impl Drop for Channel {
    fn drop(&mut self) {
        self.close();
        // Release the lifecycle lock before joining; the worker takes it to exit.
        let handle = self.inner.lock_lifecycle().handle.take();
        if let Some(handle) = handle {
            join_unless_current(handle);
        }
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("name", &self.inner.name)
            .field("open", &self.is_open())
            .field("queue", &self.inner.queue)
            .finish()
    }
}

// Joining from the worker itself (a callback closing or dropping the
// channel) would deadlock; that worker exits on its own.
fn join_unless_current(handle: JoinHandle<()>) {
    if handle.thread().id() == thread::current().id() {
        return;
    }
    if handle.join().is_err() {
        warn!("delivery worker panicked");
    }
}

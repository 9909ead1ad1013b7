//! Timestamp-ordered in-process message channel.
//!
//! Producers hand [`Message`]s to a [`Channel`]; a single delivery thread
//! dequeues them in timestamp order (insertion order among equal timestamps)
//! and invokes the subscribed callbacks. A [`ClearQueueRequest`] sent through
//! the channel purges matching pending messages instead of being delivered.
//!
//! # Example
//!
//! ```no_run
//! use courier::{Channel, ExecutionKind, LogErrorHandler, Message, Payload};
//!
//! let channel = Channel::builder("orders")
//!     .error_handler(LogErrorHandler)
//!     .build()?;
//!
//! channel.subscribe(|msg: &Message| {
//!     println!("{} {:?}", msg.timestamp_ns(), msg.kind());
//!     Ok(())
//! });
//!
//! channel.open()?;
//! channel.send(Message::new(10, Payload::execution("AAPL", ExecutionKind::Order, Vec::new())))?;
//! channel.close();
//! # Ok::<(), courier::Error>(())
//! ```

pub mod channel;
pub mod core;
pub mod message;
pub mod tracker;

pub use crate::channel::{
    BackpressurePolicy, Channel, ChannelBuilder, ChannelConfig, ChannelStats, DeliveryError,
    ErrorHandler, LogErrorHandler, SendOutcome,
};
pub use crate::core::{Clock, EnqueueOutcome, Error, PriorityQueue, QuantaClock, Result, SystemClock};
pub use crate::message::{
    ClearQueueRequest, ClearTarget, Execution, ExecutionKind, InstrumentId, Level1Change, Message,
    MessageKind, OtherMessage, Payload, QuoteChange,
};
pub use crate::tracker::{CountingTracker, MessageTracker, NoopTracker, TrackerSnapshot};

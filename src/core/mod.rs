//! Leaf primitives shared by the channel: errors, clocks and the ordered queue.

pub mod clock;
pub mod error;
pub mod queue;

pub use clock::{Clock, QuantaClock, SystemClock};
pub use error::{Error, Result};
pub use queue::{EnqueueOutcome, PriorityQueue};

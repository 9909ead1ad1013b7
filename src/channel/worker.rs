use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use log::{debug, error, warn};

use crate::channel::handler::DeliveryError;
use crate::channel::Inner;
use crate::message::Message;

/// Delivery loop for a channel, from the open that spawned it until a close
/// that is not followed by a reopen before the loop notices.
///
/// `seen_closes` is the channel's close count at spawn time.
pub(super) fn run(inner: Arc<Inner>, mut seen_closes: u64) {
    if let Some(core_id) = inner.config.core_id {
        pin_to_core(&inner.name, core_id);
    }
    debug!("delivery worker for channel {} started", inner.name);

    loop {
        if let Some((_, message)) = inner.queue.dequeue() {
            inner.tracker.remove(&message);
            deliver(&inner, &message);
        }

        // A callback may have closed and reopened the channel; each close
        // still gets its notification before the next message.
        let closes = inner.closes.load(Ordering::Acquire);
        if closes != seen_closes {
            for _ in seen_closes..closes {
                notify_closed(&inner);
            }
            seen_closes = closes;
            continue;
        }

        if inner.queue.is_closed() {
            let mut lifecycle = inner.lock_lifecycle();
            if inner.queue.is_closed() && inner.closes.load(Ordering::Acquire) == seen_closes {
                lifecycle.running = false;
                break;
            }
        }
    }

    debug!("delivery worker for channel {} exited", inner.name);
}

fn deliver(inner: &Inner, message: &Message) {
    inner.stats.record_delivered();
    let listeners = inner.on_message.snapshot();
    for callback in listeners.iter() {
        let failure = match panic::catch_unwind(AssertUnwindSafe(|| callback(message))) {
            Ok(Ok(())) => continue,
            Ok(Err(error)) => DeliveryError::Callback {
                channel: inner.name.clone(),
                timestamp_ns: message.timestamp_ns,
                kind: message.kind(),
                error,
            },
            Err(payload) => DeliveryError::Panic {
                channel: inner.name.clone(),
                timestamp_ns: message.timestamp_ns,
                kind: message.kind(),
                message: panic_message(payload.as_ref()),
            },
        };
        report(inner, failure);
    }
}

fn report(inner: &Inner, failure: DeliveryError) {
    inner.stats.record_callback_failure();
    let handler = &inner.error_handler;
    if panic::catch_unwind(AssertUnwindSafe(|| handler.handle(failure))).is_err() {
        error!("error handler for channel {} panicked", inner.name);
    }
}

fn notify_closed(inner: &Inner) {
    for callback in inner.on_closed.snapshot().iter() {
        if panic::catch_unwind(AssertUnwindSafe(|| callback())).is_err() {
            error!("on_closed listener for channel {} panicked", inner.name);
        }
    }
}

fn pin_to_core(channel: &str, core_id: usize) {
    let core = core_affinity::get_core_ids()
        .and_then(|ids| ids.into_iter().find(|core| core.id == core_id));
    match core {
        Some(core) if core_affinity::set_for_current(core) => {
            debug!("delivery worker for channel {channel} pinned to core {core_id}");
        }
        Some(_) => warn!("failed to pin delivery worker for channel {channel} to core {core_id}"),
        None => warn!("core {core_id} not available for channel {channel}"),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

use log::error;

use crate::message::MessageKind;

/// A subscriber failure observed by the delivery worker.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("channel `{channel}`: subscriber failed on {kind} message at {timestamp_ns}: {error:#}")]
    Callback {
        channel: String,
        timestamp_ns: u64,
        kind: MessageKind,
        error: anyhow::Error,
    },
    #[error("channel `{channel}`: subscriber panicked on {kind} message at {timestamp_ns}: {message}")]
    Panic {
        channel: String,
        timestamp_ns: u64,
        kind: MessageKind,
        message: String,
    },
}

impl DeliveryError {
    pub fn channel(&self) -> &str {
        match self {
            DeliveryError::Callback { channel, .. } | DeliveryError::Panic { channel, .. } => channel,
        }
    }

    pub fn timestamp_ns(&self) -> u64 {
        match self {
            DeliveryError::Callback { timestamp_ns, .. }
            | DeliveryError::Panic { timestamp_ns, .. } => *timestamp_ns,
        }
    }
}

/// Sink for subscriber failures.
///
/// Called on the delivery thread. A panicking handler is caught and logged
/// so delivery continues either way.
pub trait ErrorHandler: Send + Sync {
    fn handle(&self, error: DeliveryError);
}

impl<F> ErrorHandler for F
where
    F: Fn(DeliveryError) + Send + Sync,
{
    fn handle(&self, error: DeliveryError) {
        self(error)
    }
}

/// Reports subscriber failures through the `log` facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogErrorHandler;

impl ErrorHandler for LogErrorHandler {
    fn handle(&self, error: DeliveryError) {
        error!("{error}");
    }
}

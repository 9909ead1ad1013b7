//! Messages carried by a channel.
//!
//! Payload contents are opaque to the transport; only the kind, the
//! instrument and (for executions) the execution kind are inspected, and
//! only by [`ClearQueueRequest::matches`].

use std::fmt;

#[cfg(feature = "config")]
use serde::{Deserialize, Serialize};

use crate::core::Clock;

/// Discriminator of a [`Message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MessageKind {
    Execution,
    QuoteChange,
    Level1Change,
    ClearQueue,
    Other,
}

impl MessageKind {
    pub const ALL: [MessageKind; 5] = [
        MessageKind::Execution,
        MessageKind::QuoteChange,
        MessageKind::Level1Change,
        MessageKind::ClearQueue,
        MessageKind::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::Execution => "execution",
            MessageKind::QuoteChange => "quote_change",
            MessageKind::Level1Change => "level1_change",
            MessageKind::ClearQueue => "clear_queue",
            MessageKind::Other => "other",
        }
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "config", derive(Serialize, Deserialize), serde(transparent))]
pub struct InstrumentId(String);

impl InstrumentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for InstrumentId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for InstrumentId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for InstrumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Whether an execution report describes an order state change or a fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "config", derive(Serialize, Deserialize), serde(rename_all = "snake_case"))]
pub enum ExecutionKind {
    Order,
    Trade,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "config", derive(Serialize, Deserialize))]
pub struct Execution {
    pub instrument: InstrumentId,
    pub kind: ExecutionKind,
    #[cfg_attr(feature = "config", serde(default))]
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "config", derive(Serialize, Deserialize))]
pub struct QuoteChange {
    pub instrument: InstrumentId,
    #[cfg_attr(feature = "config", serde(default))]
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "config", derive(Serialize, Deserialize))]
pub struct Level1Change {
    pub instrument: InstrumentId,
    #[cfg_attr(feature = "config", serde(default))]
    pub data: Vec<u8>,
}

/// Any message the transport does not inspect, tagged by an application type id.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "config", derive(Serialize, Deserialize))]
pub struct OtherMessage {
    pub type_id: u16,
    #[cfg_attr(feature = "config", serde(default))]
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(
    feature = "config",
    derive(Serialize, Deserialize),
    serde(tag = "type", rename_all = "snake_case")
)]
pub enum Payload {
    Execution(Execution),
    QuoteChange(QuoteChange),
    Level1Change(Level1Change),
    ClearQueue(ClearQueueRequest),
    Other(OtherMessage),
}

impl Payload {
    pub fn execution(
        instrument: impl Into<InstrumentId>,
        kind: ExecutionKind,
        data: Vec<u8>,
    ) -> Self {
        Payload::Execution(Execution {
            instrument: instrument.into(),
            kind,
            data,
        })
    }

    pub fn quote_change(instrument: impl Into<InstrumentId>, data: Vec<u8>) -> Self {
        Payload::QuoteChange(QuoteChange {
            instrument: instrument.into(),
            data,
        })
    }

    pub fn level1_change(instrument: impl Into<InstrumentId>, data: Vec<u8>) -> Self {
        Payload::Level1Change(Level1Change {
            instrument: instrument.into(),
            data,
        })
    }

    pub fn other(type_id: u16, data: Vec<u8>) -> Self {
        Payload::Other(OtherMessage { type_id, data })
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            Payload::Execution(_) => MessageKind::Execution,
            Payload::QuoteChange(_) => MessageKind::QuoteChange,
            Payload::Level1Change(_) => MessageKind::Level1Change,
            Payload::ClearQueue(_) => MessageKind::ClearQueue,
            Payload::Other(_) => MessageKind::Other,
        }
    }
}

/// A timestamped unit of work flowing through a channel.
///
/// `timestamp_ns` is the ordering key and is assigned by the producer.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "config", derive(Serialize, Deserialize))]
pub struct Message {
    pub timestamp_ns: u64,
    pub payload: Payload,
}

impl Message {
    pub fn new(timestamp_ns: u64, payload: Payload) -> Self {
        Self {
            timestamp_ns,
            payload,
        }
    }

    /// Stamp `payload` with the current time of `clock`.
    pub fn stamped<C: Clock + ?Sized>(clock: &C, payload: Payload) -> Self {
        Self::new(clock.now(), payload)
    }

    /// A control message that purges matching pending messages when sent.
    pub fn clear(request: ClearQueueRequest) -> Self {
        Self::new(0, Payload::ClearQueue(request))
    }

    pub fn timestamp_ns(&self) -> u64 {
        self.timestamp_ns
    }

    pub fn kind(&self) -> MessageKind {
        self.payload.kind()
    }

    pub fn instrument(&self) -> Option<&InstrumentId> {
        match &self.payload {
            Payload::Execution(exec) => Some(&exec.instrument),
            Payload::QuoteChange(quote) => Some(&quote.instrument),
            Payload::Level1Change(level1) => Some(&level1.instrument),
            Payload::ClearQueue(_) | Payload::Other(_) => None,
        }
    }

    pub fn execution_kind(&self) -> Option<ExecutionKind> {
        match &self.payload {
            Payload::Execution(exec) => Some(exec.kind),
            _ => None,
        }
    }
}

/// Kinds of pending messages a [`ClearQueueRequest`] can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "config", derive(Serialize, Deserialize), serde(rename_all = "snake_case"))]
pub enum ClearTarget {
    Execution,
    QuoteChange,
    Level1Change,
}

/// Purge pending messages of one kind, optionally narrowed to an instrument
/// and, for executions, to an execution kind. No target clears everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "config", derive(Serialize, Deserialize), serde(default))]
pub struct ClearQueueRequest {
    pub target: Option<ClearTarget>,
    pub instrument: Option<InstrumentId>,
    pub execution_kind: Option<ExecutionKind>,
}

impl ClearQueueRequest {
    /// Clear every pending message regardless of kind.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn target(target: ClearTarget) -> Self {
        Self {
            target: Some(target),
            ..Self::default()
        }
    }

    pub fn with_instrument(mut self, instrument: impl Into<InstrumentId>) -> Self {
        self.instrument = Some(instrument.into());
        self
    }

    /// Only meaningful when targeting executions.
    pub fn with_execution_kind(mut self, kind: ExecutionKind) -> Self {
        self.execution_kind = Some(kind);
        self
    }

    /// Whether `message` would be removed by this request.
    pub fn matches(&self, message: &Message) -> bool {
        let Some(target) = self.target else {
            return true;
        };
        match (target, &message.payload) {
            (ClearTarget::Execution, Payload::Execution(exec)) => {
                self.instrument_matches(&exec.instrument)
                    && self.execution_kind.map_or(true, |kind| kind == exec.kind)
            }
            (ClearTarget::QuoteChange, Payload::QuoteChange(quote)) => {
                self.instrument_matches(&quote.instrument)
            }
            (ClearTarget::Level1Change, Payload::Level1Change(level1)) => {
                self.instrument_matches(&level1.instrument)
            }
            _ => false,
        }
    }

    fn instrument_matches(&self, instrument: &InstrumentId) -> bool {
        self.instrument.as_ref().map_or(true, |id| id == instrument)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exec(ts: u64, instrument: &str, kind: ExecutionKind) -> Message {
        Message::new(ts, Payload::execution(instrument, kind, Vec::new()))
    }

    #[test]
    fn clear_all_matches_every_kind() {
        let request = ClearQueueRequest::all();
        assert!(request.matches(&exec(1, "A", ExecutionKind::Order)));
        assert!(request.matches(&Message::new(2, Payload::quote_change("B", Vec::new()))));
        assert!(request.matches(&Message::new(3, Payload::other(7, vec![1, 2]))));
    }

    #[test]
    fn execution_filter_honours_instrument_and_kind() {
        let request = ClearQueueRequest::target(ClearTarget::Execution)
            .with_instrument("A")
            .with_execution_kind(ExecutionKind::Trade);

        assert!(request.matches(&exec(1, "A", ExecutionKind::Trade)));
        assert!(!request.matches(&exec(1, "A", ExecutionKind::Order)));
        assert!(!request.matches(&exec(1, "B", ExecutionKind::Trade)));
        assert!(!request.matches(&Message::new(1, Payload::quote_change("A", Vec::new()))));
    }

    #[test]
    fn execution_kind_is_ignored_for_other_targets() {
        let request = ClearQueueRequest::target(ClearTarget::Level1Change)
            .with_execution_kind(ExecutionKind::Trade);

        assert!(request.matches(&Message::new(1, Payload::level1_change("X", Vec::new()))));
        assert!(!request.matches(&Message::new(1, Payload::quote_change("X", Vec::new()))));
    }

    #[test]
    fn targeted_clear_never_matches_untyped_messages() {
        let request = ClearQueueRequest::target(ClearTarget::QuoteChange);
        assert!(!request.matches(&Message::new(1, Payload::other(1, Vec::new()))));
        assert!(request.matches(&Message::new(1, Payload::quote_change("Z", Vec::new()))));
    }

    #[test]
    fn accessors_report_kind_and_instrument() {
        let msg = exec(5, "ES", ExecutionKind::Order);
        assert_eq!(msg.kind(), MessageKind::Execution);
        assert_eq!(msg.instrument().map(InstrumentId::as_str), Some("ES"));
        assert_eq!(msg.execution_kind(), Some(ExecutionKind::Order));

        let clear = Message::clear(ClearQueueRequest::all());
        assert_eq!(clear.kind(), MessageKind::ClearQueue);
        assert_eq!(clear.instrument(), None);
    }

    #[cfg(feature = "config")]
    #[test]
    fn messages_decode_from_json() {
        let msg: Message = serde_json::from_str(
            r#"{"timestamp_ns":10,"payload":{"type":"execution","instrument":"A","kind":"trade"}}"#,
        )
        .unwrap();
        assert_eq!(msg, exec(10, "A", ExecutionKind::Trade));

        let clear: Message = serde_json::from_str(
            r#"{"timestamp_ns":0,"payload":{"type":"clear_queue","target":"quote_change"}}"#,
        )
        .unwrap();
        assert_eq!(
            clear,
            Message::clear(ClearQueueRequest::target(ClearTarget::QuoteChange))
        );
    }
}

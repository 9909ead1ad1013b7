#![allow(dead_code)]

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use courier::{Channel, ExecutionKind, LogErrorHandler, Message, Payload};

pub const GATE_TYPE: u16 = u16::MAX;
pub const WAIT: Duration = Duration::from_secs(2);

/// A channel whose subscriber parks on gate messages until released, so
/// tests can pile up pending messages behind a busy worker.
pub struct Gated {
    pub channel: Arc<Channel>,
    pub delivered: Receiver<Message>,
    pub entered: Receiver<()>,
    pub release: Sender<()>,
}

impl Gated {
    pub fn new(channel: Channel) -> Self {
        let (delivered_tx, delivered) = mpsc::channel();
        let (entered_tx, entered) = mpsc::channel();
        let (release, release_rx) = mpsc::channel::<()>();
        let release_rx = Mutex::new(release_rx);

        channel.subscribe(move |msg: &Message| {
            if matches!(&msg.payload, Payload::Other(other) if other.type_id == GATE_TYPE) {
                let _ = entered_tx.send(());
                let _ = release_rx.lock().unwrap().recv_timeout(WAIT);
                return Ok(());
            }
            let _ = delivered_tx.send(msg.clone());
            Ok(())
        });

        Self {
            channel: Arc::new(channel),
            delivered,
            entered,
            release,
        }
    }

    pub fn unbounded(name: &str) -> Self {
        Self::new(Channel::new(name, LogErrorHandler).expect("channel"))
    }

    /// Send a gate message and wait until the worker is parked on it.
    pub fn hold(&self) {
        self.channel.send(gate()).expect("send gate");
        self.entered.recv_timeout(WAIT).expect("worker parked");
    }

    pub fn open(&self) {
        self.channel.open().expect("open");
    }

    pub fn collect(&self, count: usize) -> Vec<Message> {
        (0..count)
            .map(|_| self.delivered.recv_timeout(WAIT).expect("delivery"))
            .collect()
    }

    pub fn assert_idle(&self) {
        assert!(self
            .delivered
            .recv_timeout(Duration::from_millis(100))
            .is_err());
    }
}

pub fn gate() -> Message {
    Message::new(0, Payload::other(GATE_TYPE, Vec::new()))
}

pub fn execution(ts: u64, instrument: &str, kind: ExecutionKind) -> Message {
    Message::new(ts, Payload::execution(instrument, kind, Vec::new()))
}

pub fn quote(ts: u64, instrument: &str) -> Message {
    Message::new(ts, Payload::quote_change(instrument, Vec::new()))
}

pub fn level1(ts: u64, instrument: &str) -> Message {
    Message::new(ts, Payload::level1_change(instrument, Vec::new()))
}

pub fn other(ts: u64, type_id: u16, data: Vec<u8>) -> Message {
    Message::new(ts, Payload::other(type_id, data))
}

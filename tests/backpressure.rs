mod common;

use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use common::{other, Gated, WAIT};
use courier::{BackpressurePolicy, Channel, Error, LogErrorHandler, SendOutcome};

fn bounded(name: &str, max: usize, policy: BackpressurePolicy) -> Gated {
    Gated::new(
        Channel::builder(name)
            .error_handler(LogErrorHandler)
            .max_message_count(Some(max))
            .backpressure(policy)
            .build()
            .expect("build"),
    )
}

#[test]
fn full_channel_blocks_second_send_until_dequeue() {
    let gated = bounded("bp-block", 1, BackpressurePolicy::default());
    assert_eq!(gated.channel.max_message_count(), Some(1));
    gated.open();
    gated.hold();

    gated.channel.send(other(1, 1, Vec::new())).unwrap();

    let (done_tx, done_rx) = mpsc::channel();
    let channel = Arc::clone(&gated.channel);
    let producer = thread::spawn(move || {
        let outcome = channel.send(other(2, 1, Vec::new()));
        let _ = done_tx.send(());
        outcome
    });

    assert!(done_rx.recv_timeout(Duration::from_millis(100)).is_err());
    assert_eq!(gated.channel.message_count(), 1);

    gated.release.send(()).unwrap();
    done_rx.recv_timeout(WAIT).expect("producer unblocked");
    assert_eq!(producer.join().unwrap().unwrap(), SendOutcome::Queued);

    let delivered: Vec<_> = gated.collect(2).iter().map(|m| m.timestamp_ns).collect();
    assert_eq!(delivered, vec![1, 2]);
}

#[test]
fn close_releases_blocked_sender_without_queuing() {
    let gated = bounded("bp-close", 1, BackpressurePolicy::default());
    gated.open();
    gated.hold();
    gated.channel.send(other(1, 1, Vec::new())).unwrap();

    let channel = Arc::clone(&gated.channel);
    let producer = thread::spawn(move || channel.send(other(2, 1, Vec::new())));

    thread::sleep(Duration::from_millis(50));
    gated.channel.close();
    assert_eq!(producer.join().unwrap().unwrap(), SendOutcome::NotQueued);
    assert_eq!(gated.channel.message_count(), 0);

    gated.release.send(()).unwrap();
    gated.assert_idle();
}

#[test]
fn timeout_policy_reports_queue_full() {
    let gated = bounded(
        "bp-timeout",
        1,
        BackpressurePolicy::Block {
            timeout: Some(Duration::from_millis(20)),
        },
    );
    gated.open();
    gated.hold();
    gated.channel.send(other(1, 1, Vec::new())).unwrap();

    let err = gated.channel.send(other(2, 1, Vec::new())).unwrap_err();
    assert!(matches!(err, Error::QueueFull));
    assert_eq!(gated.channel.stats().sent, 2);

    gated.release.send(()).unwrap();
    assert_eq!(gated.collect(1)[0].timestamp_ns, 1);
}

#[test]
fn raising_capacity_unblocks_senders() {
    let gated = bounded("bp-resize", 1, BackpressurePolicy::default());
    gated.open();
    gated.hold();
    gated.channel.send(other(1, 1, Vec::new())).unwrap();

    let channel = Arc::clone(&gated.channel);
    let producer = thread::spawn(move || channel.send(other(2, 1, Vec::new())));

    thread::sleep(Duration::from_millis(50));
    gated.channel.set_max_message_count(None);
    assert_eq!(producer.join().unwrap().unwrap(), SendOutcome::Queued);
    assert_eq!(gated.channel.message_count(), 2);
    assert_eq!(gated.channel.max_message_count(), None);

    gated.release.send(()).unwrap();
    gated.collect(2);
}

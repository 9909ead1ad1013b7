use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc, Mutex};

use anyhow::{Context, Result};
use clap::Parser;
use hdrhistogram::Histogram;
use log::{info, warn};

use courier::{
    Channel, ChannelBuilder, ChannelConfig, Clock, Error, LogErrorHandler, Message, MessageKind,
    QuantaClock, SendOutcome,
};

/// Replay a JSON-lines message script through a channel and print the
/// delivery order.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON-lines file, one message per line
    #[arg(short, long)]
    script: PathBuf,

    /// Optional JSON channel config (name, max_message_count, backpressure, core_id)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Maximum pending messages (overrides the config file; unbounded if unset)
    #[arg(long)]
    capacity: Option<usize>,

    /// Make the subscriber fail on messages with this timestamp
    #[arg(long)]
    fail_on: Option<u64>,

    /// Restamp messages at send time and report send-to-delivery latency
    #[arg(long)]
    latency: bool,
}

fn load_script(path: &Path) -> Result<Vec<Message>> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut messages = Vec::new();
    for (line_no, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() || line.trim_start().starts_with('#') {
            continue;
        }
        let msg: Message = serde_json::from_str(&line)
            .with_context(|| format!("Invalid message on line {}", line_no + 1))?;
        messages.push(msg);
    }
    Ok(messages)
}

fn build_channel(args: &Args) -> Result<Channel> {
    let mut config = match &args.config {
        Some(path) => ChannelConfig::from_path(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => ChannelConfig::unbounded("replay"),
    };
    if config.name.is_empty() {
        config.name = "replay".to_string();
    }
    if args.capacity.is_some() {
        config.max_message_count = args.capacity;
    }
    ChannelBuilder::from_config(config)
        .error_handler(LogErrorHandler)
        .build()
        .context("Failed to build channel")
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let messages = load_script(&args.script)?;
    info!("Loaded {} messages from {}", messages.len(), args.script.display());

    let channel = build_channel(&args)?;
    let clock = Arc::new(QuantaClock::new());
    let histogram = Arc::new(Mutex::new(
        Histogram::<u64>::new(3).context("Failed to create histogram")?,
    ));

    let (delivered_tx, delivered_rx) = mpsc::channel::<()>();
    {
        let fail_on = args.fail_on;
        let latency = args.latency;
        let clock = Arc::clone(&clock);
        let histogram = Arc::clone(&histogram);
        channel.subscribe(move |msg: &Message| {
            if latency {
                let elapsed = clock.now().saturating_sub(msg.timestamp_ns);
                if let Ok(mut hist) = histogram.lock() {
                    hist.saturating_record(elapsed);
                }
            }
            let instrument = msg.instrument().map_or("-", |id| id.as_str());
            println!("{}\t{}\t{}", msg.timestamp_ns, msg.kind(), instrument);
            let _ = delivered_tx.send(());
            if fail_on == Some(msg.timestamp_ns) {
                anyhow::bail!("injected failure");
            }
            Ok(())
        });
    }

    channel.open().context("Failed to open channel")?;
    let mut queued = 0;
    let mut purged = 0;
    let mut rejected = 0;
    for msg in messages {
        let msg = if args.latency && msg.kind() != MessageKind::ClearQueue {
            Message::stamped(clock.as_ref(), msg.payload)
        } else {
            msg
        };
        let (timestamp, kind) = (msg.timestamp_ns, msg.kind());
        match channel.send(msg) {
            Ok(SendOutcome::Queued) => queued += 1,
            Ok(SendOutcome::Cleared { removed }) => {
                purged += removed;
                println!("cleared {removed} pending messages");
            }
            Ok(SendOutcome::NotQueued) => rejected += 1,
            Err(Error::QueueFull) => {
                warn!("Dropped {kind} message at {timestamp}: channel full");
                rejected += 1;
            }
            Err(err) => return Err(err).context("Failed to send message"),
        }
    }

    // Every queued message is either purged by a clear or delivered.
    for _ in 0..queued - purged {
        delivered_rx
            .recv()
            .context("Delivery thread stopped before draining the queue")?;
    }
    channel.close();
    let stats = channel.stats();
    // Joins the delivery thread so every callback has finished printing.
    drop(channel);

    println!("{}", stats.summary());
    if rejected > 0 {
        println!("rejected {rejected} messages");
    }
    if args.latency {
        let hist = histogram
            .lock()
            .map_err(|_| anyhow::anyhow!("latency histogram lock poisoned"))?;
        println!(
            "latency ns: p50={} p99={} p99.9={} max={}",
            hist.value_at_quantile(0.50),
            hist.value_at_quantile(0.99),
            hist.value_at_quantile(0.999),
            hist.max()
        );
    }
    Ok(())
}

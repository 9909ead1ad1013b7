use std::time::{SystemTime, UNIX_EPOCH};

/// A source of message timestamps.
///
/// Producers stamp messages before sending; the queue only orders by the
/// timestamp it is given and never assigns one itself.
pub trait Clock: Send + Sync + 'static {
    /// Returns the current timestamp in nanoseconds since the UNIX epoch.
    fn now(&self) -> u64;
}

/// Wall-clock time via `std::time::SystemTime`.
///
/// Susceptible to NTP adjustments, so stamps from this clock are not
/// guaranteed to be monotonic across calls.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        wall_clock_ns()
    }
}

/// TSC-backed clock via the `quanta` crate.
///
/// Anchored to wall-clock time at construction and advanced with TSC ticks
/// afterwards, so it never jumps backwards.
#[derive(Debug, Clone)]
pub struct QuantaClock {
    clock: quanta::Clock,
    start_wall_ns: u64,
    start_instant: quanta::Instant,
}

impl Default for QuantaClock {
    fn default() -> Self {
        let clock = quanta::Clock::new();
        let start_instant = clock.now();
        Self {
            clock,
            start_wall_ns: wall_clock_ns(),
            start_instant,
        }
    }
}

impl QuantaClock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clock for QuantaClock {
    fn now(&self) -> u64 {
        let delta = self.clock.now().duration_since(self.start_instant);
        self.start_wall_ns
            .saturating_add(u64::try_from(delta.as_nanos()).unwrap_or(u64::MAX))
    }
}

// A clock before the epoch or past u64 nanoseconds reads as the nearest bound.
fn wall_clock_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

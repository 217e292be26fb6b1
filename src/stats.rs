use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// A ceiling past which the accumulated wait duration resets to zero
/// rather than risk losing precision or overflowing on conversion.
/// Chosen far above any plausible real uptime (roughly 31,000 years).
const WAIT_DURATION_CEILING_SECS: f64 = 1e12;

/// Monotone pool counters. All increments saturate instead of wrapping.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    wait_count: AtomicU64,
    wait_duration_secs: Mutex<f64>,
    idle_closed: AtomicU64,
    life_closed: AtomicU64,
}

fn saturating_increment(counter: &AtomicU64) {
    let _ = counter.fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| {
        Some(v.saturating_add(1))
    });
}

impl Counters {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_wait(&self, elapsed: Duration) {
        saturating_increment(&self.wait_count);

        let mut guard = self.wait_duration_secs.lock().unwrap();
        let next = *guard + elapsed.as_secs_f64();
        *guard = if next.is_finite() && next < WAIT_DURATION_CEILING_SECS {
            next
        } else {
            0.0
        };
    }

    pub(crate) fn record_idle_closed(&self) {
        saturating_increment(&self.idle_closed);
    }

    pub(crate) fn record_life_closed(&self) {
        saturating_increment(&self.life_closed);
    }

    pub(crate) fn wait_count(&self) -> u64 {
        self.wait_count.load(Ordering::Acquire)
    }

    pub(crate) fn wait_duration(&self) -> Duration {
        Duration::from_secs_f64(*self.wait_duration_secs.lock().unwrap())
    }

    pub(crate) fn idle_closed(&self) -> u64 {
        self.idle_closed.load(Ordering::Acquire)
    }

    pub(crate) fn life_closed(&self) -> u64 {
        self.life_closed.load(Ordering::Acquire)
    }
}

/// A point-in-time snapshot of pool health and traffic.
///
/// `in_use` may transiently exceed `max_active` while a resize-down is
/// still converging: live borrows are never revoked, so the excess is
/// visible here until each one is returned and destroyed. This is by
/// design, not a bug in the snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    /// The configured hard cap on total connections at the time of the
    /// snapshot.
    pub max_active: u32,
    /// Every connection currently owned by the pool, idle or borrowed.
    pub total_count: usize,
    /// Connections currently sitting in the idle queue.
    pub idle: usize,
    /// `total_count - idle`.
    pub in_use: usize,
    /// Total number of borrows that actually had to wait for the idle
    /// queue, cumulative since the pool was created.
    pub wait_count: u64,
    /// Total time spent waiting across all such borrows.
    pub wait_duration: Duration,
    /// Connections evicted by the validator for sitting idle too long.
    pub idle_closed: u64,
    /// Connections evicted by the validator (or on borrow/return) for
    /// exceeding `max_life_time`.
    pub life_closed: u64,
}

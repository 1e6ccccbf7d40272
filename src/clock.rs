//! Deterministic clock
//!
//! Internal logic that needs an ordering or a seed (blank-node labels,
//! cache keys) reads ticks from a [`Clock`] instead of the wall clock, so
//! that a sandboxed host replaying the same inputs gets the same artifacts.
//!
//! Two implementations are provided:
//! - [`DeterministicClock`]: starts at a fixed epoch, advances by a fixed step
//! - [`MonotonicClock`]: nanoseconds elapsed since the clock was created
//!
//! Both guarantee that every call returns a value `>=` all previous values.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

/// Fixed epoch used by the deterministic clock when none is configured
pub const DEFAULT_EPOCH: u64 = 0;

/// Default increment of the deterministic clock
pub const DEFAULT_STEP: u64 = 1;

/// Source of monotonic ticks
pub trait Clock: Send + Sync {
    /// Current tick; never smaller than a previously returned tick
    fn now(&self) -> u64;
}

/// Fixed-increment clock for reproducible builds
#[derive(Debug)]
pub struct DeterministicClock {
    next: AtomicU64,
    step: u64,
}

impl DeterministicClock {
    /// Create a clock that returns `start`, `start + step`, `start + 2*step`, ...
    pub fn new(start: u64, step: u64) -> Self {
        Self {
            next: AtomicU64::new(start),
            step,
        }
    }
}

impl Default for DeterministicClock {
    fn default() -> Self {
        Self::new(DEFAULT_EPOCH, DEFAULT_STEP)
    }
}

impl Clock for DeterministicClock {
    fn now(&self) -> u64 {
        // Saturate instead of wrapping so monotonicity survives overflow
        let mut current = self.next.load(Ordering::Relaxed);
        loop {
            let advanced = current.saturating_add(self.step);
            match self.next.compare_exchange_weak(
                current,
                advanced,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return current,
                Err(observed) => current = observed,
            }
        }
    }
}

/// Real monotonic clock for native builds
#[derive(Debug)]
pub struct MonotonicClock {
    origin: Instant,
    last: AtomicU64,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            last: AtomicU64::new(0),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> u64 {
        let elapsed = u64::try_from(self.origin.elapsed().as_nanos()).unwrap_or(u64::MAX);
        // fetch_max keeps the value non-decreasing across threads
        let previous = self.last.fetch_max(elapsed, Ordering::Relaxed);
        previous.max(elapsed)
    }
}

/// Clock selection used by configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ClockKind {
    /// Fixed epoch, fixed increment
    Deterministic {
        #[serde(default)]
        start: u64,
        #[serde(default = "default_step")]
        step: u64,
    },
    /// Wall-clock independent monotonic time
    Monotonic,
}

fn default_step() -> u64 {
    DEFAULT_STEP
}

impl Default for ClockKind {
    fn default() -> Self {
        if cfg!(all(target_family = "wasm", target_os = "unknown")) {
            ClockKind::Deterministic {
                start: DEFAULT_EPOCH,
                step: DEFAULT_STEP,
            }
        } else {
            ClockKind::Monotonic
        }
    }
}

impl ClockKind {
    /// Build a fresh clock of this kind
    pub fn build(&self) -> Arc<dyn Clock> {
        match *self {
            ClockKind::Deterministic { start, step } => Arc::new(DeterministicClock::new(start, step)),
            ClockKind::Monotonic => Arc::new(MonotonicClock::new()),
        }
    }
}

static GLOBAL_CLOCK: OnceLock<Arc<dyn Clock>> = OnceLock::new();

/// Process-wide clock: deterministic on `wasm32-unknown-unknown`, monotonic elsewhere
pub fn global() -> Arc<dyn Clock> {
    GLOBAL_CLOCK
        .get_or_init(|| ClockKind::default().build())
        .clone()
}

/// Current tick of the process-wide clock
pub fn now_ticks() -> u64 {
    global().now()
}

//! Scheduling defaults and tuning constants.
//! Caps, pacing and pull-loop tuning in one place.

use std::time::Duration;

// ---- Admission caps ----

/// Default cap on concurrent workers per SVar.
pub const DEFAULT_THREAD_CAP: usize = 1500;

/// Default cap on buffered output values per SVar.
pub const DEFAULT_BUFFER_CAP: usize = 1500;

// ---- Pacing / latency ----

/// Latency estimator and rate pacer tuning.
pub struct PacerConsts;

impl PacerConsts {
    /// Per-yield latency assumed before any worker has been measured (ns).
    pub const SEED_LATENCY_NS: u64 = 100_000;
    /// Rolling latency update keeps 3 parts old estimate to 1 part sample.
    pub const SMOOTHING_OLD_WEIGHT: u64 = 3;
    /// Shortest pause the pacer will ask the puller to sleep.
    pub const PAUSE_MIN: Duration = Duration::from_micros(100);
    /// Longest pause the pacer will ask the puller to sleep.
    pub const PAUSE_MAX: Duration = Duration::from_millis(50);
}

// ---- Pull loop ----

/// How long the puller blocks for output before re-checking quiescence
/// and re-dispatching workers.
pub const PULL_TIMEOUT: Duration = Duration::from_millis(5);

/// How long a blocked producer waits on the buffer-space gate before
/// re-checking the stop flag.
pub const SPACE_WAIT: Duration = Duration::from_millis(10);

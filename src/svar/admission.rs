//! Admission control: resolved caps, the yield budget, the latency
//! estimator and the rate pacer.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering::SeqCst};
use std::time::Duration;

use crate::error::ConfigError;
use crate::types::StreamOpts;
use crate::utils::config::{DEFAULT_BUFFER_CAP, DEFAULT_THREAD_CAP, PacerConsts};

/// Thread and buffer caps after resolving the 0-default / -1-unlimited
/// convention. `None` means unlimited.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Limits {
    pub thread_cap: Option<usize>,
    pub buffer_cap: Option<usize>,
}

fn resolve_cap(n: isize, default: usize) -> Result<Option<usize>, isize> {
    match n {
        0 => Ok(Some(default)),
        -1 => Ok(None),
        n if n > 0 => Ok(Some(n as usize)),
        other => Err(other),
    }
}

impl Limits {
    pub fn resolve(opts: &StreamOpts) -> Result<Self, ConfigError> {
        let thread_cap =
            resolve_cap(opts.max_threads, DEFAULT_THREAD_CAP).map_err(ConfigError::ThreadCap)?;
        let buffer_cap =
            resolve_cap(opts.max_buffer, DEFAULT_BUFFER_CAP).map_err(ConfigError::BufferCap)?;
        Ok(Limits {
            thread_cap,
            buffer_cap,
        })
    }
}

/// Pre-claimed yield budget. Claims are taken before a value is admitted
/// to the buffer, so an SVar with a budget of n emits exactly n values.
pub(crate) struct YieldBudget {
    limited: bool,
    left: AtomicI64,
}

impl YieldBudget {
    pub fn new(cap: Option<u64>) -> Self {
        let left = cap.unwrap_or(0).min(i64::MAX as u64) as i64;
        YieldBudget {
            limited: cap.is_some(),
            left: AtomicI64::new(left),
        }
    }

    /// Take one yield from the budget. A failed claim leaves the budget
    /// untouched.
    pub fn try_claim(&self) -> bool {
        if !self.limited {
            return true;
        }
        if self.left.fetch_sub(1, SeqCst) > 0 {
            true
        } else {
            self.left.fetch_add(1, SeqCst);
            false
        }
    }

    /// Give back a claim whose value was never admitted.
    pub fn release(&self) {
        if self.limited {
            self.left.fetch_add(1, SeqCst);
        }
    }

    pub fn exhausted(&self) -> bool {
        self.limited && self.left.load(SeqCst) <= 0
    }
}

/// Rolling estimate of wall-clock nanoseconds per yield, seeded from the
/// configured hint and updated as workers finish.
pub(crate) struct LatencyMeter {
    nanos_per_yield: AtomicU64,
}

impl LatencyMeter {
    pub fn new(seed_ns: Option<u64>) -> Self {
        let seed = seed_ns.unwrap_or(PacerConsts::SEED_LATENCY_NS).max(1);
        LatencyMeter {
            nanos_per_yield: AtomicU64::new(seed),
        }
    }

    pub fn record(&self, yields: u64, elapsed: Duration) {
        if yields == 0 {
            return;
        }
        let sample = ((elapsed.as_nanos() as u64) / yields).max(1);
        let old = self.nanos_per_yield.load(SeqCst);
        let w = PacerConsts::SMOOTHING_OLD_WEIGHT;
        let next = (old.saturating_mul(w).saturating_add(sample)) / (w + 1);
        self.nanos_per_yield.store(next.max(1), SeqCst);
    }

    pub fn nanos_per_yield(&self) -> u64 {
        self.nanos_per_yield.load(SeqCst)
    }
}

/// Gates dispatch so that `workers / latency` stays at or under the target
/// rate. Never gates below one worker; for targets slower than a single
/// worker's natural rate the puller adds pauses between dispatches.
pub(crate) struct Pacer {
    target_per_sec: f64,
}

impl Pacer {
    pub fn from_opts(opts: &StreamOpts) -> Result<Option<Self>, ConfigError> {
        match opts.max_rate {
            None => Ok(None),
            Some(r) if r > 0.0 && r.is_finite() => Ok(Some(Pacer { target_per_sec: r })),
            Some(r) => Err(ConfigError::Rate(r)),
        }
    }

    /// Expected yields per second are `workers / latency`; the worker count
    /// that keeps that at the target is `target * latency`.
    pub fn allowed_workers(&self, meter: &LatencyMeter) -> usize {
        let latency_secs = meter.nanos_per_yield() as f64 / 1e9;
        ((self.target_per_sec * latency_secs) as usize).max(1)
    }

    /// How long the puller should sleep between dispatch attempts when the
    /// pacer is the limiting factor.
    pub fn pause(&self, meter: &LatencyMeter) -> Duration {
        Duration::from_nanos(meter.nanos_per_yield())
            .clamp(PacerConsts::PAUSE_MIN, PacerConsts::PAUSE_MAX)
    }
}

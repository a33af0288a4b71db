//! Public types for the rill API: evaluation styles and stream options.

/// Evaluation style of a stream composition. Chooses traversal order,
/// output ordering and the degree of concurrency.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Style {
    /// Depth-first, source order, no concurrency.
    Serial,
    /// Breadth-first interleave of the composed streams, no concurrency.
    WSerial,
    /// Speculative workers, output restored to source order.
    Ahead,
    /// LIFO work queue, output in arrival order.
    Async,
    /// FIFO work queue, branches visited round-robin, arrival order.
    WAsync,
    /// One worker per producer, spawned eagerly.
    Parallel,
}

impl Style {
    /// Whether this style schedules producers through an [`SVar`](crate::SVar).
    pub fn is_concurrent(self) -> bool {
        !matches!(self, Style::Serial | Style::WSerial)
    }
}

/// Options for streams evaluated under a concurrent style. Applied to the
/// SVar forced from the stream they are set on; they do not propagate to
/// enclosing compositions.
///
/// Cap fields use the shared convention: `0` means the built-in default,
/// `-1` removes the limit, any other negative value is rejected when the
/// SVar is created.
#[derive(Clone, Debug, Default)]
pub struct StreamOpts {
    /// Max concurrent workers. 0 = default (1500), -1 = unlimited.
    pub max_threads: isize,
    /// Max buffered output values. 0 = default (1500), -1 = unlimited.
    pub max_buffer: isize,
    /// Remaining-yield budget. When Some(n), the SVar emits at most n values.
    pub max_yields: Option<u64>,
    /// Target output rate in yields per second. When None, unpaced.
    /// A stored target must be positive and finite; anything else is
    /// rejected when the SVar is created.
    pub max_rate: Option<f64>,
    /// Seed for the per-yield latency estimate in nanoseconds, used for the
    /// first dispatch decisions before any worker has been measured.
    pub serial_latency_ns: Option<u64>,
}

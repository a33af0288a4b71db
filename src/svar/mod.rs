//! SVar: the per-stream scheduling object. Ties the work queue, ordering
//! heap, output channel and worker pool together, and bridges back to a
//! plain stream on the consumer side.

mod admission;
mod channel;
mod heap;
mod queue;
mod worker;

use log::{debug, warn};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering::SeqCst};
use std::sync::{Arc, Weak};
use std::time::Duration;

use crate::error::ConfigError;
use crate::stream::step::{Step, Stream};
use crate::types::{Style, StreamOpts};
use crate::utils::config::PULL_TIMEOUT;

use admission::{LatencyMeter, Limits, Pacer, YieldBudget};
use channel::{Cell, OutputChannel};
use heap::{AheadEntry, OrderHeap};
use queue::{Work, WorkQueue};

/// Verdict on one value offered to the output buffer.
pub(crate) enum Emit<T> {
    /// Admitted; keep going.
    Sent,
    /// Buffer full; the value comes back and the worker should park its
    /// remaining work and exit.
    Overflow(T),
    /// The SVar is stopping (consumer gone, failure pending or budget
    /// spent); drop the value and exit.
    Halted,
}

/// Per-stream scheduling state shared by the consumer and the workers.
pub struct SVar<T> {
    self_ref: Weak<SVar<T>>,
    style: Style,
    out: OutputChannel<T>,
    queue: WorkQueue<T>,
    heap: Mutex<OrderHeap<T>>,
    /// Sequence number currently holding the publish token (Ahead).
    next_seq: AtomicU64,
    workers: AtomicUsize,
    worker_ids: AtomicUsize,
    thread_cap: Option<usize>,
    budget: YieldBudget,
    pacer: Option<Pacer>,
    meter: LatencyMeter,
    stopped: AtomicBool,
    failed: AtomicBool,
}

impl<T: Send + 'static> SVar<T> {
    /// Create an SVar for a concurrent style, validating the configuration.
    pub fn new(style: Style, opts: &StreamOpts) -> crate::Result<Arc<Self>> {
        if !style.is_concurrent() {
            return Err(ConfigError::NotConcurrent(style).into());
        }
        let limits = Limits::resolve(opts)?;
        let pacer = Pacer::from_opts(opts)?;
        debug!(
            "svar: style={:?} thread_cap={:?} buffer_cap={:?} yields={:?} rate={:?}",
            style, limits.thread_cap, limits.buffer_cap, opts.max_yields, opts.max_rate
        );
        Ok(Arc::new_cyclic(|weak| SVar {
            self_ref: weak.clone(),
            style,
            out: OutputChannel::new(limits.buffer_cap),
            queue: WorkQueue::new(style),
            heap: Mutex::new(OrderHeap::new()),
            next_seq: AtomicU64::new(0),
            workers: AtomicUsize::new(0),
            worker_ids: AtomicUsize::new(0),
            thread_cap: limits.thread_cap,
            budget: YieldBudget::new(opts.max_yields),
            pacer,
            meter: LatencyMeter::new(opts.serial_latency_ns),
            stopped: AtomicBool::new(false),
            failed: AtomicBool::new(false),
        }))
    }

    pub(crate) fn style(&self) -> Style {
        self.style
    }

    pub(crate) fn stopped(&self) -> bool {
        self.stopped.load(SeqCst)
    }

    pub(crate) fn failed(&self) -> bool {
        self.failed.load(SeqCst)
    }

    /// Final shutdown: workers observe this at their next admission check.
    pub(crate) fn mark_stopped(&self) {
        if !self.stopped.swap(true, SeqCst) {
            debug!("svar: stopped with {} values buffered", self.out.buffered());
            self.out.notify_space();
        }
    }

    /// Record that a failure is pending. Returns true for the first caller;
    /// only that caller's failure travels to the consumer.
    pub(crate) fn note_failure(&self) -> bool {
        !self.failed.swap(true, SeqCst)
    }

    // ---- Work queue ----

    pub(crate) fn enqueue(&self, stream: Stream<T>) -> u64 {
        self.queue.enqueue(stream)
    }

    pub(crate) fn enqueue_after(
        &self,
        seq: u64,
        streams: Vec<Stream<T>>,
    ) -> Result<(), Vec<Stream<T>>> {
        self.queue.enqueue_after(seq, streams)
    }

    pub(crate) fn requeue(&self, work: Work<T>) {
        self.queue.requeue(work);
    }

    pub(crate) fn dequeue(&self) -> Option<Work<T>> {
        self.queue.dequeue()
    }

    // ---- Ordering heap / token ----

    pub(crate) fn token_seq(&self) -> u64 {
        self.next_seq.load(SeqCst)
    }

    pub(crate) fn advance_token(&self) {
        self.next_seq.fetch_add(1, SeqCst);
    }

    pub(crate) fn heap_insert(&self, seq: u64, entry: AheadEntry<T>) {
        self.heap.lock().insert(seq, entry);
    }

    pub(crate) fn heap_pop_if(&self, seq: u64) -> Option<AheadEntry<T>> {
        self.heap.lock().pop_if(seq)
    }

    fn heap_is_empty(&self) -> bool {
        self.heap.lock().is_empty()
    }

    // ---- Admission ----

    /// Offer one value to the output buffer under the admission rules.
    /// Claims the yield budget before admitting so a budget of n emits
    /// exactly n values.
    pub(crate) fn admit_and_push(&self, v: T) -> Emit<T> {
        if self.stopped() || self.failed() {
            return Emit::Halted;
        }
        if !self.budget.try_claim() {
            return Emit::Halted;
        }
        match self.out.try_push(v) {
            Ok(()) => Emit::Sent,
            Err(v) => {
                if self.style == Style::Parallel {
                    // Eager style has no queue to park work in; wait for room.
                    match self.out.push_wait(v, &self.stopped) {
                        Ok(()) => Emit::Sent,
                        Err(_) => {
                            self.budget.release();
                            Emit::Halted
                        }
                    }
                } else {
                    self.budget.release();
                    Emit::Overflow(v)
                }
            }
        }
    }

    /// Heap entries are only actionable once their seq holds the token;
    /// entries past the token wait for the in-flight seqs before them.
    fn heap_head_is_token(&self) -> bool {
        self.style == Style::Ahead && self.heap.lock().head_seq() == Some(self.token_seq())
    }

    fn has_pending_work(&self) -> bool {
        !self.queue.is_empty() || self.heap_head_is_token()
    }

    fn pacer_allows(&self, live: usize) -> bool {
        match &self.pacer {
            None => true,
            Some(pacer) => live <= pacer.allowed_workers(&self.meter),
        }
    }

    /// Checked by a worker after each work item: queued work left, buffer
    /// below cap, budget left, pace within target.
    pub(crate) fn worker_may_continue(&self) -> bool {
        !self.stopped()
            && !self.failed()
            && !self.budget.exhausted()
            && !self.out.is_full()
            && self.has_pending_work()
            && self.pacer_allows(self.workers.load(SeqCst))
    }

    // ---- Dispatch ----

    /// Spawn one worker if there is pending work and every cap allows it.
    pub(crate) fn dispatch_one(&self) -> bool {
        loop {
            if self.stopped() || self.failed() || self.budget.exhausted() || self.out.is_full() {
                return false;
            }
            if !self.has_pending_work() {
                return false;
            }
            let live = self.workers.load(SeqCst);
            if let Some(cap) = self.thread_cap
                && live >= cap
            {
                return false;
            }
            if !self.pacer_allows(live + 1) {
                return false;
            }
            if self
                .workers
                .compare_exchange(live, live + 1, SeqCst, SeqCst)
                .is_ok()
            {
                let Some(sv) = self.self_ref.upgrade() else {
                    self.workers.fetch_sub(1, SeqCst);
                    return false;
                };
                worker::spawn(sv);
                return true;
            }
        }
    }

    /// Consumer-side dispatch after a drain: one worker per pending item.
    fn dispatch_pending(&self) {
        let mut want = self.queue.len();
        if self.heap_head_is_token() {
            want += 1;
        }
        for _ in 0..want {
            if !self.dispatch_one() {
                break;
            }
        }
    }

    // ---- Worker bookkeeping ----

    pub(crate) fn alloc_worker_id(&self) -> usize {
        self.worker_ids.fetch_add(1, SeqCst)
    }

    pub(crate) fn worker_spawn_failed(&self) {
        self.workers.fetch_sub(1, SeqCst);
    }

    /// Worker exit: fold the latency sample in, report the stop cell, then
    /// drop out of the live count. The stop cell goes first so the consumer
    /// never sees a zero count with a failure still in flight.
    pub(crate) fn finish_worker(
        &self,
        wid: usize,
        yields: u64,
        elapsed: Duration,
        err: Option<crate::Error>,
    ) {
        self.meter.record(yields, elapsed);
        let failure = match err {
            Some(e) => {
                if self.note_failure() {
                    Some(e)
                } else {
                    warn!("worker {wid}: suppressing later failure: {e:#}");
                    None
                }
            }
            None => None,
        };
        self.out.send_stop(wid, failure);
        self.workers.fetch_sub(1, SeqCst);
        debug!("worker {wid}: exited after {yields} yields");
    }

    /// True when nothing can produce another value: no live workers, no
    /// queued or parked work, nothing buffered. Budget exhaustion quiesces
    /// regardless of leftover work.
    fn is_quiesced(&self) -> bool {
        if self.stopped() {
            return true;
        }
        if self.workers.load(SeqCst) != 0 || !self.out.is_empty() {
            return false;
        }
        if self.budget.exhausted() {
            return true;
        }
        self.queue.is_empty() && self.heap_is_empty()
    }

    fn pull_timeout(&self) -> Duration {
        match &self.pacer {
            Some(pacer) => pacer.pause(&self.meter),
            None => PULL_TIMEOUT,
        }
    }
}

/// Enqueue a producer onto an SVar's work queue and kick the dispatcher.
/// Never blocks; backpressure reaches producers through the push verdict.
pub fn push_stream<T: Send + 'static>(sv: &Arc<SVar<T>>, stream: Stream<T>) {
    sv.enqueue(stream);
    sv.dispatch_one();
}

/// Drain an SVar as a plain sequential stream.
pub fn pull_stream<T: Send + 'static>(sv: Arc<SVar<T>>) -> Stream<T> {
    Puller {
        sv,
        batch: VecDeque::new(),
        failure: None,
    }
    .into_stream()
}

/// Force a concurrent composition onto a fresh SVar configured by `opts`
/// and hand back the draining stream.
pub(crate) fn force<T: Send + 'static>(
    style: Style,
    opts: StreamOpts,
    node: Stream<T>,
) -> crate::Result<Stream<T>> {
    let sv = SVar::new(style, &opts)?;
    push_stream(&sv, node);
    Ok(pull_stream(sv))
}

/// Consumer-side bridge. Pulls cell batches, accounts worker stops and
/// re-dispatches workers after each drain. Dropping it (with the stream)
/// marks the SVar stopped so workers wind down.
struct Puller<T: Send + 'static> {
    sv: Arc<SVar<T>>,
    batch: VecDeque<T>,
    failure: Option<crate::Error>,
}

impl<T: Send + 'static> Puller<T> {
    fn into_stream(self) -> Stream<T> {
        Stream::from_step(move || self.step())
    }

    fn step(mut self) -> crate::Result<Step<T>> {
        loop {
            if let Some(v) = self.batch.pop_front() {
                return Ok(Step::Yield(v, self.into_stream()));
            }
            if let Some(e) = self.failure.take() {
                return Err(e);
            }
            if self.sv.is_quiesced() {
                return Ok(Step::Stop);
            }
            self.sv.dispatch_pending();
            let timeout = self.sv.pull_timeout();
            let cells = self.sv.out.recv_batch(timeout);
            let mut drained = 0;
            for cell in cells {
                match cell {
                    Cell::Yield(v) => {
                        drained += 1;
                        self.batch.push_back(v);
                    }
                    Cell::Stop { worker, failure } => {
                        debug!("puller: worker {worker} stopped");
                        if let Some(e) = failure {
                            // Deliver what is already buffered, then raise.
                            self.failure = Some(e);
                        }
                    }
                }
            }
            self.sv.out.note_drained(drained);
        }
    }
}

impl<T: Send + 'static> Drop for Puller<T> {
    fn drop(&mut self) {
        self.sv.mark_stopped();
    }
}

//! Worker loops: drain the work queue under the style's discipline and
//! deliver values through the output channel.
//!
//! Flat styles (Async, WAsync, Parallel) publish in arrival order. Ahead
//! restores source order: the worker whose sequence number matches the
//! token publishes directly, everyone else makes bounded speculative
//! progress and parks results on the ordering heap.

use log::warn;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use crate::stream::step::{Shape, Step, Stream};
use crate::types::{Style, StreamOpts};

use super::heap::AheadEntry;
use super::queue::Work;
use super::{Emit, SVar};

/// How a drive loop ended.
enum Flow {
    /// The continuation ran to its stop arrow.
    Finished,
    /// Buffer full; remaining work was parked and the worker should exit.
    Parked,
    /// The SVar is stopping; drop everything and exit.
    Halted,
}

pub(crate) fn spawn<T: Send + 'static>(sv: Arc<SVar<T>>) {
    let wid = sv.alloc_worker_id();
    let builder = thread::Builder::new().name(format!("rill-worker-{wid}"));
    let thread_sv = Arc::clone(&sv);
    let spawned = builder.spawn(move || {
        let started = Instant::now();
        let mut yields = 0u64;
        let result = match thread_sv.style() {
            Style::Ahead => ahead_loop(&thread_sv, &mut yields),
            _ => flat_loop(&thread_sv, &mut yields),
        };
        thread_sv.finish_worker(wid, yields, started.elapsed(), result.err());
    });
    if let Err(e) = spawned {
        warn!("worker spawn failed: {e}");
        sv.worker_spawn_failed();
    }
}

/// Resolve a composition of another style found mid-drive. A concurrent
/// style runs on its own SVar; a sequential one evaluates in-line, one
/// value per step.
fn foreign_node<T: Send + 'static>(
    style: Style,
    opts: StreamOpts,
    left: Stream<T>,
    right: Stream<T>,
) -> crate::Result<Stream<T>> {
    let node = Stream::node(style, left, right);
    if style.is_concurrent() {
        return super::force(style, opts, node);
    }
    Ok(Stream::from_step(move || {
        Ok(match node.uncons()? {
            None => Step::Stop,
            Some((v, rest)) => Step::Yield(v, rest),
        })
    }))
}

/// Walk the left spine of same-style nodes, scheduling each right operand
/// as its own work item, and return the leftmost stream to drive here.
fn split_spine<T: Send + 'static>(
    sv: &Arc<SVar<T>>,
    left: Stream<T>,
    right: Stream<T>,
) -> Stream<T> {
    let mut rights = vec![right];
    let mut cur = left;
    loop {
        match cur.shape() {
            Shape::Node {
                style,
                left,
                right,
                ..
            } if style == sv.style() => {
                rights.push(*right);
                cur = *left;
            }
            other => {
                cur = other.reassemble();
                break;
            }
        }
    }
    // Collected outermost-first; source order is innermost-first.
    rights.reverse();
    for r in rights {
        sv.enqueue(r);
        sv.dispatch_one();
    }
    cur
}

// ---- Flat styles: Async, WAsync, Parallel ----

fn flat_loop<T: Send + 'static>(sv: &Arc<SVar<T>>, yields: &mut u64) -> crate::Result<()> {
    loop {
        let Some(work) = sv.dequeue() else {
            return Ok(());
        };
        match drive_flat(sv, work, yields)? {
            Flow::Parked | Flow::Halted => return Ok(()),
            Flow::Finished => {}
        }
        if !sv.worker_may_continue() {
            return Ok(());
        }
    }
}

fn drive_flat<T: Send + 'static>(
    sv: &Arc<SVar<T>>,
    work: Work<T>,
    yields: &mut u64,
) -> crate::Result<Flow> {
    let seq = work.seq;
    let mut stream = work.stream;
    let rotate = sv.style() == Style::WAsync;
    loop {
        match stream.shape() {
            Shape::Node {
                style,
                left,
                right,
                ..
            } if style == sv.style() => {
                stream = split_spine(sv, *left, *right);
            }
            Shape::Node {
                style,
                left,
                right,
                opts,
            } => {
                stream = foreign_node(style, opts, *left, *right)?;
            }
            Shape::Leaf(f) => {
                let (v, rest) = match f()? {
                    Step::Stop => return Ok(Flow::Finished),
                    Step::Skip(next) => {
                        stream = next;
                        continue;
                    }
                    Step::Single(v) => (v, None),
                    Step::Yield(v, rest) => (v, Some(rest)),
                };
                match sv.admit_and_push(v) {
                    Emit::Sent => {
                        *yields += 1;
                        match rest {
                            None => return Ok(Flow::Finished),
                            Some(rest) if rotate => {
                                // Breadth-first: one value, then back of the line.
                                sv.enqueue(rest);
                                return Ok(Flow::Finished);
                            }
                            Some(rest) => stream = rest,
                        }
                    }
                    Emit::Overflow(v) => {
                        let parked = match rest {
                            None => Stream::once(v),
                            Some(rest) => Stream::cons(v, rest),
                        };
                        sv.requeue(Work {
                            seq,
                            stream: parked,
                        });
                        return Ok(Flow::Parked);
                    }
                    Emit::Halted => return Ok(Flow::Halted),
                }
            }
        }
    }
}

// ---- Ahead ----

fn ahead_loop<T: Send + 'static>(sv: &Arc<SVar<T>>, yields: &mut u64) -> crate::Result<()> {
    loop {
        match drain_heap(sv, yields)? {
            Flow::Parked | Flow::Halted => return Ok(()),
            Flow::Finished => {}
        }
        let Some(work) = sv.dequeue() else {
            return Ok(());
        };
        if work.seq == sv.token_seq() {
            match drive_token(sv, work.seq, work.stream, yields)? {
                Flow::Finished => sv.advance_token(),
                Flow::Parked | Flow::Halted => return Ok(()),
            }
        } else {
            speculate(sv, work.seq, work.stream)?;
        }
        if !sv.worker_may_continue() {
            return Ok(());
        }
    }
}

/// Publish heap entries for as long as the head matches the token.
fn drain_heap<T: Send + 'static>(sv: &Arc<SVar<T>>, yields: &mut u64) -> crate::Result<Flow> {
    loop {
        let seq = sv.token_seq();
        let Some(entry) = sv.heap_pop_if(seq) else {
            return Ok(Flow::Finished);
        };
        match entry {
            AheadEntry::Empty => sv.advance_token(),
            AheadEntry::Ready(v) => match sv.admit_and_push(v) {
                Emit::Sent => {
                    *yields += 1;
                    sv.advance_token();
                }
                Emit::Overflow(v) => {
                    sv.heap_insert(seq, AheadEntry::Ready(v));
                    return Ok(Flow::Parked);
                }
                Emit::Halted => return Ok(Flow::Halted),
            },
            AheadEntry::Suspended(stream) => match drive_token(sv, seq, stream, yields)? {
                Flow::Finished => sv.advance_token(),
                parked_or_halted => return Ok(parked_or_halted),
            },
        }
    }
}

/// Drive a continuation as the token holder, streaming every value into
/// the output buffer. On a full buffer the remainder goes back on the heap
/// under the current seq and the token stays put.
fn drive_token<T: Send + 'static>(
    sv: &Arc<SVar<T>>,
    seq: u64,
    mut stream: Stream<T>,
    yields: &mut u64,
) -> crate::Result<Flow> {
    loop {
        match stream.shape() {
            Shape::Node {
                style,
                left,
                right,
                ..
            } if style == sv.style() => {
                stream = split_ahead(sv, seq, *left, *right)?;
            }
            Shape::Node {
                style,
                left,
                right,
                opts,
            } => {
                stream = foreign_node(style, opts, *left, *right)?;
            }
            Shape::Leaf(f) => {
                let (v, rest) = match f()? {
                    Step::Stop => return Ok(Flow::Finished),
                    Step::Skip(next) => {
                        stream = next;
                        continue;
                    }
                    Step::Single(v) => (v, None),
                    Step::Yield(v, rest) => (v, Some(rest)),
                };
                match sv.admit_and_push(v) {
                    Emit::Sent => {
                        *yields += 1;
                        match rest {
                            None => return Ok(Flow::Finished),
                            Some(rest) => stream = rest,
                        }
                    }
                    Emit::Overflow(v) => {
                        let parked = match rest {
                            None => AheadEntry::Ready(v),
                            Some(rest) => AheadEntry::Suspended(Stream::cons(v, rest)),
                        };
                        sv.heap_insert(seq, parked);
                        return Ok(Flow::Parked);
                    }
                    Emit::Halted => return Ok(Flow::Halted),
                }
            }
        }
    }
}

/// Evaluate a continuation that does not hold the token: force at most its
/// first value, park the outcome on the heap, and go back to scheduling.
fn speculate<T: Send + 'static>(
    sv: &Arc<SVar<T>>,
    seq: u64,
    mut stream: Stream<T>,
) -> crate::Result<()> {
    loop {
        match stream.shape() {
            Shape::Node {
                style,
                left,
                right,
                ..
            } if style == sv.style() => {
                stream = split_ahead(sv, seq, *left, *right)?;
            }
            Shape::Node {
                style,
                left,
                right,
                opts,
            } => {
                stream = foreign_node(style, opts, *left, *right)?;
            }
            Shape::Leaf(f) => {
                let entry = match f()? {
                    Step::Skip(next) => {
                        stream = next;
                        continue;
                    }
                    Step::Stop => AheadEntry::Empty,
                    Step::Single(v) => AheadEntry::Ready(v),
                    Step::Yield(v, rest) => AheadEntry::Suspended(Stream::cons(v, rest)),
                };
                sv.heap_insert(seq, entry);
                return Ok(());
            }
        }
    }
}

/// Split a same-style node under Ahead. Scheduling the right operands is
/// only sound while `seq` is the newest assigned sequence number (their
/// values must precede everything admitted later); otherwise the node runs
/// on a nested SVar, which preserves order at the cost of sharing.
fn split_ahead<T: Send + 'static>(
    sv: &Arc<SVar<T>>,
    seq: u64,
    left: Stream<T>,
    right: Stream<T>,
) -> crate::Result<Stream<T>> {
    let mut rights = vec![right];
    let mut cur = left;
    loop {
        match cur.shape() {
            Shape::Node {
                style,
                left,
                right,
                ..
            } if style == Style::Ahead => {
                rights.push(*right);
                cur = *left;
            }
            other => {
                cur = other.reassemble();
                break;
            }
        }
    }
    rights.reverse();
    let count = rights.len();
    match sv.enqueue_after(seq, rights) {
        Ok(()) => {
            for _ in 0..count {
                sv.dispatch_one();
            }
            Ok(cur)
        }
        Err(rights) => {
            // Later sequence numbers exist already; rebuild the node and
            // run it on its own SVar.
            let mut node = cur;
            for r in rights {
                node = Stream::node(Style::Ahead, node, r);
            }
            super::force(Style::Ahead, StreamOpts::default(), node)
        }
    }
}

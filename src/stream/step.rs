//! Lazy stream values: producer steps, composition nodes and the in-line
//! evaluation paths for the sequential styles.

use crate::types::{Style, StreamOpts};

/// One resumption of a producer. `Skip` is an administrative step that
/// rewrites the stream without producing a value; the evaluation loops
/// absorb it, so consumers only ever observe stop, single or cons.
pub enum Step<T> {
    /// The producer is exhausted.
    Stop,
    /// Exactly one value remains.
    Single(T),
    /// A value and the rest of the stream.
    Yield(T, Stream<T>),
    /// No value this step; continue with the given stream.
    Skip(Stream<T>),
}

/// A boxed, one-shot producer step. Calling it performs the producer's
/// effects for one resumption and returns the next [`Step`].
pub(crate) type StepFn<T> = Box<dyn FnOnce() -> crate::Result<Step<T>> + Send>;

pub(crate) enum Inner<T> {
    /// A plain producer continuation.
    Leaf(StepFn<T>),
    /// An unevaluated composition of two streams under a style. Sequential
    /// styles evaluate it in-line; concurrent styles force it onto an SVar.
    Node {
        style: Style,
        left: Box<Stream<T>>,
        right: Box<Stream<T>>,
    },
}

/// A lazy stream of values. Nothing runs until the stream is pulled,
/// either directly with [`Stream::uncons`] or through its iterator.
pub struct Stream<T> {
    pub(crate) inner: Inner<T>,
    pub(crate) opts: StreamOpts,
}

/// Compose two streams under a style. This is the monoid operation of the
/// style: the node stays unevaluated until the result is pulled.
pub fn combine<T: Send + 'static>(style: Style, left: Stream<T>, right: Stream<T>) -> Stream<T> {
    Stream::node(style, left, right)
}

/// Destructured form of a stream, used by the worker drive loops.
pub(crate) enum Shape<T> {
    Leaf(StepFn<T>),
    Node {
        style: Style,
        left: Box<Stream<T>>,
        right: Box<Stream<T>>,
        opts: StreamOpts,
    },
}

impl<T: Send + 'static> Shape<T> {
    pub(crate) fn reassemble(self) -> Stream<T> {
        match self {
            Shape::Leaf(f) => Stream {
                inner: Inner::Leaf(f),
                opts: StreamOpts::default(),
            },
            Shape::Node {
                style,
                left,
                right,
                opts,
            } => Stream {
                inner: Inner::Node { style, left, right },
                opts,
            },
        }
    }
}

impl<T: Send + 'static> Stream<T> {
    /// Build a stream from a single producer step.
    pub fn from_step<F>(f: F) -> Self
    where
        F: FnOnce() -> crate::Result<Step<T>> + Send + 'static,
    {
        Stream {
            inner: Inner::Leaf(Box::new(f)),
            opts: StreamOpts::default(),
        }
    }

    pub(crate) fn node(style: Style, left: Stream<T>, right: Stream<T>) -> Self {
        Stream {
            inner: Inner::Node {
                style,
                left: Box::new(left),
                right: Box::new(right),
            },
            opts: StreamOpts::default(),
        }
    }

    pub(crate) fn shape(self) -> Shape<T> {
        match self.inner {
            Inner::Leaf(f) => Shape::Leaf(f),
            Inner::Node { style, left, right } => Shape::Node {
                style,
                left,
                right,
                opts: self.opts,
            },
        }
    }

    /// The empty stream.
    pub fn empty() -> Self {
        Self::from_step(|| Ok(Step::Stop))
    }

    /// A one-value stream.
    pub fn once(v: T) -> Self {
        Self::from_step(move || Ok(Step::Single(v)))
    }

    /// Prepend a value to a stream.
    pub fn cons(v: T, rest: Stream<T>) -> Self {
        Self::from_step(move || Ok(Step::Yield(v, rest)))
    }

    /// A stream over any iterator.
    pub fn from_iter<I>(iter: I) -> Self
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: Send + 'static,
    {
        fn go<T, It>(mut it: It) -> Stream<T>
        where
            T: Send + 'static,
            It: Iterator<Item = T> + Send + 'static,
        {
            Stream::from_step(move || {
                Ok(match it.next() {
                    None => Step::Stop,
                    Some(v) => Step::Yield(v, go(it)),
                })
            })
        }
        go(iter.into_iter())
    }

    /// Generate a stream from a seed.
    pub fn unfold<S, F>(seed: S, f: F) -> Self
    where
        S: Send + 'static,
        F: FnMut(S) -> Option<(T, S)> + Send + 'static,
    {
        fn go<T, S, F>(seed: S, mut f: F) -> Stream<T>
        where
            T: Send + 'static,
            S: Send + 'static,
            F: FnMut(S) -> Option<(T, S)> + Send + 'static,
        {
            Stream::from_step(move || {
                Ok(match f(seed) {
                    None => Step::Stop,
                    Some((v, next)) => Step::Yield(v, go(next, f)),
                })
            })
        }
        go(seed, f)
    }

    /// Fallible [`Stream::unfold`]; an `Err` from the generator terminates
    /// the stream with that failure.
    pub fn try_unfold<S, F>(seed: S, f: F) -> Self
    where
        S: Send + 'static,
        F: FnMut(S) -> crate::Result<Option<(T, S)>> + Send + 'static,
    {
        fn go<T, S, F>(seed: S, mut f: F) -> Stream<T>
        where
            T: Send + 'static,
            S: Send + 'static,
            F: FnMut(S) -> crate::Result<Option<(T, S)>> + Send + 'static,
        {
            Stream::from_step(move || {
                Ok(match f(seed)? {
                    None => Step::Stop,
                    Some((v, next)) => Step::Yield(v, go(next, f)),
                })
            })
        }
        go(seed, f)
    }

    /// An endless stream of values from a closure.
    pub fn repeat_with<F>(f: F) -> Self
    where
        F: FnMut() -> T + Send + 'static,
    {
        fn go<T, F>(mut f: F) -> Stream<T>
        where
            T: Send + 'static,
            F: FnMut() -> T + Send + 'static,
        {
            Stream::from_step(move || {
                let v = f();
                Ok(Step::Yield(v, go(f)))
            })
        }
        go(f)
    }

    /// Monadic bind under a style: each outer value is mapped to an inner
    /// stream, and inner streams are composed with the remainder under
    /// `style`. Under a concurrent style the inner streams land on the same
    /// SVar, so iterations overlap while the style's ordering holds.
    pub fn concat_map_with<U, F>(self, style: Style, f: F) -> Stream<U>
    where
        U: Send + 'static,
        F: FnMut(T) -> Stream<U> + Send + 'static,
    {
        fn go<T, U, F>(outer: Stream<T>, style: Style, mut f: F) -> Stream<U>
        where
            T: Send + 'static,
            U: Send + 'static,
            F: FnMut(T) -> Stream<U> + Send + 'static,
        {
            Stream::from_step(move || {
                Ok(match outer.uncons()? {
                    None => Step::Stop,
                    Some((v, rest)) => {
                        let inner = f(v);
                        Step::Skip(combine(style, inner, go(rest, style, f)))
                    }
                })
            })
        }
        go(self, style, f)
    }

    /// Pull one value. Sequential compositions evaluate in-line here;
    /// a concurrent composition is forced onto a fresh SVar on first pull
    /// and the rest of the stream drains from it.
    pub fn uncons(self) -> crate::Result<Option<(T, Stream<T>)>> {
        let mut cur = self;
        loop {
            let Stream { inner, opts } = cur;
            match inner {
                Inner::Leaf(f) => match f()? {
                    Step::Stop => return Ok(None),
                    Step::Single(v) => return Ok(Some((v, Stream::empty()))),
                    Step::Yield(v, rest) => return Ok(Some((v, rest))),
                    Step::Skip(next) => cur = next,
                },
                Inner::Node {
                    style: Style::Serial,
                    left,
                    right,
                } => match left.uncons()? {
                    None => cur = *right,
                    Some((v, lrest)) => {
                        return Ok(Some((v, Stream::node(Style::Serial, lrest, *right))));
                    }
                },
                // Interleave: after a yield the operands swap places.
                Inner::Node {
                    style: Style::WSerial,
                    left,
                    right,
                } => match left.uncons()? {
                    None => cur = *right,
                    Some((v, lrest)) => {
                        return Ok(Some((v, Stream::node(Style::WSerial, *right, lrest))));
                    }
                },
                Inner::Node { style, left, right } => {
                    cur = crate::svar::force(style, opts, Stream::node(style, *left, *right))?;
                }
            }
        }
    }

    // ---- Configuration knobs ----

    /// Cap concurrent workers for the SVar forced from this stream.
    /// 0 resets to the default, -1 removes the limit.
    pub fn max_threads(mut self, n: isize) -> Self {
        self.opts.max_threads = n;
        self
    }

    /// Cap buffered output values for the SVar forced from this stream.
    /// 0 resets to the default, -1 removes the limit.
    pub fn max_buffer(mut self, n: isize) -> Self {
        self.opts.max_buffer = n;
        self
    }

    /// Limit the total number of values the SVar forced from this stream
    /// may emit. `None` removes the limit.
    pub fn max_yields(mut self, n: Option<u64>) -> Self {
        self.opts.max_yields = n;
        self
    }

    /// Target output rate in yields per second. Anything that is not
    /// positive and finite is rejected when the SVar is created.
    pub fn max_rate(mut self, r: f64) -> Self {
        self.opts.max_rate = Some(r);
        self
    }

    /// Seed the latency estimate used for the first dispatch decisions.
    pub fn serial_latency(mut self, ns: u64) -> Self {
        self.opts.serial_latency_ns = Some(ns);
        self
    }
}

//! Rill: lazy streams with pluggable concurrent evaluation styles
//!
//! A stream is a lazy chain of producer steps. How those producers are
//! scheduled is chosen per composition: fully sequential ([`Style::Serial`]),
//! interleaved ([`Style::WSerial`]), speculatively ahead but source-ordered
//! ([`Style::Ahead`]), unordered ([`Style::Async`], [`Style::WAsync`]) or one
//! worker per producer ([`Style::Parallel`]). Concurrent styles run through a
//! per-stream scheduling object, the [`SVar`], which owns the work queue, the
//! ordering heap, the output buffer and the worker pool.

pub mod error;
pub mod stream;
pub mod svar;
pub mod types;
pub mod utils;

/// Re-export types for API
pub use types::*;

pub use error::ConfigError;
pub use stream::{Step, Stream, StreamIter, combine};
pub use svar::{SVar, pull_stream, push_stream};

/// Result alias used by the public rill API
pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, Error>;

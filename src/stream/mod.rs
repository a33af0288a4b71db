//! Lazy stream values, composition and the sequential evaluation paths.

pub mod consume;
pub mod step;

pub use consume::StreamIter;
pub use step::{Step, Stream, combine};

//! Configuration errors rejected when an SVar is created.

use crate::types::Style;
use thiserror::Error;

/// Invalid stream configuration. Caps accept `0` (default) and `-1`
/// (unlimited); any other negative value is refused rather than guessed at.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid thread cap {0}: use 0 for the default or -1 for unlimited")]
    ThreadCap(isize),
    #[error("invalid buffer cap {0}: use 0 for the default or -1 for unlimited")]
    BufferCap(isize),
    #[error("target rate must be a positive finite number, got {0}")]
    Rate(f64),
    #[error("style {0:?} evaluates in-line and does not take an SVar")]
    NotConcurrent(Style),
}

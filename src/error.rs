//! Error taxonomy shared by every fallible control-task-facing operation.
//!
//! Per the locking/propagation discipline the rest of the crate follows, none
//! of these ever reach the audio thread: the audio path either silently no-ops
//! on an invalid read or — for the handful of conditions it can observe, like
//! a missing buffer — logs once and moves on (see [`crate::sample_store`]).

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("index out of range: {0}")]
    InvalidIndex(&'static str),

    #[error("no sample buffer loaded on pad {0}")]
    BufferNotLoaded(usize),

    #[error("out of memory loading sample for pad {0}")]
    OutOfMemory(usize),

    #[error("too many active filters in category {0} (max {1})")]
    TooManyActiveFilters(&'static str, usize),

    #[error("invalid parameter: {0}")]
    InvalidParameter(&'static str),

    #[error("pad {0} busy: buffer still referenced by an active voice")]
    Busy(usize),
}

pub type EngineResult<T> = Result<T, EngineError>;

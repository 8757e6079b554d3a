//! Error types for the Stream Parts subsystem.

use shared_types::StreamPartId;
use thiserror::Error;

use crate::domain::NumberPair;

/// Duplicate detection errors. Both are recoverable: drop the message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DetectorError {
    /// `previous` does not precede `current`.
    #[error("pre-condition: previous < current (previous: {previous}, current: {current})")]
    InvalidNumbering {
        previous: NumberPair,
        current: NumberPair,
    },

    /// `(previous, current]` straddles a gap boundary.
    #[error("pre-condition: gap overlap in given numbers: previous={previous}, current={current}, state={state}")]
    GapMisMatch {
        state: String,
        previous: NumberPair,
        current: NumberPair,
    },
}

/// Stream part manager errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamPartError {
    #[error("Stream part {0} already set up")]
    AlreadySetUp(StreamPartId),

    #[error("Stream part {0} is not set up")]
    NotSetUp(StreamPartId),

    #[error(transparent)]
    Detector(#[from] DetectorError),
}

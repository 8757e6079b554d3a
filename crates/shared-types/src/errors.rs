//! # Error Types
//!
//! Parsing errors for the shared identifiers.

use thiserror::Error;

/// Errors raised when parsing a textual identifier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdParseError {
    /// The `stream#partition` separator is missing.
    #[error("Invalid stream part id '{0}': expected <stream_id>#<partition>")]
    MissingSeparator(String),

    /// The partition suffix is not a valid number.
    #[error("Invalid partition in stream part id '{0}'")]
    InvalidPartition(String),

    /// The stream id part is empty.
    #[error("Stream id must not be empty")]
    EmptyStreamId,
}

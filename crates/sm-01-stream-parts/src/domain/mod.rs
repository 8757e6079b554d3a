//! Domain layer for sm-01: numbering, duplicate detection and topic entries.

pub mod detector;
pub mod entities;
pub mod number_pair;

pub use detector::{DuplicateMessageDetector, DEFAULT_MAX_NUMBER_OF_GAPS};
pub use entities::StreamPartEntry;
pub use number_pair::NumberPair;

//! Positions in a publisher's message chain.

use shared_types::MessageRef;
use std::fmt;

/// A `(timestamp, sequence number)` pair, ordered lexicographically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NumberPair {
    pub a: u64,
    pub b: u64,
}

impl NumberPair {
    /// Open upper bound of the newest gap.
    pub const MAX: NumberPair = NumberPair {
        a: u64::MAX,
        b: u64::MAX,
    };

    pub const fn new(a: u64, b: u64) -> Self {
        Self { a, b }
    }
}

impl From<MessageRef> for NumberPair {
    fn from(r: MessageRef) -> Self {
        Self::new(r.timestamp, r.sequence_number)
    }
}

fn write_component(f: &mut fmt::Formatter<'_>, value: u64) -> fmt::Result {
    if value == u64::MAX {
        f.write_str("Infinity")
    } else {
        write!(f, "{value}")
    }
}

impl fmt::Display for NumberPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_component(f, self.a)?;
        f.write_str("|")?;
        write_component(f, self.b)
    }
}

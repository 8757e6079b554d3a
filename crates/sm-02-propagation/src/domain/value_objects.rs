//! Value objects for propagation configuration.

use std::time::Duration;

/// Target neighbor count per topic that trackers aim for.
pub const DEFAULT_MAX_NEIGHBOR_COUNT: usize = 4;

/// Propagation configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PropagationConfig {
    /// Accepted sends after which a task is complete. Zero disables retries.
    pub min_propagation_targets: usize,
    /// How long an unfinished task is kept for neighbor-join retries.
    pub ttl: Duration,
    /// Maximum number of unfinished tasks; the oldest is dropped beyond it.
    pub max_messages: usize,
}

impl Default for PropagationConfig {
    fn default() -> Self {
        Self {
            min_propagation_targets: DEFAULT_MAX_NEIGHBOR_COUNT / 2,
            ttl: Duration::from_secs(30),
            max_messages: 10_000,
        }
    }
}

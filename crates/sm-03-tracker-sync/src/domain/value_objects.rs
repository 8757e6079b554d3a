//! Value objects for tracker synchronization.

use parking_lot::Mutex;
use shared_types::{InstructionMessage, TrackerId, TrackerRecord};
use sm_01_stream_parts::StreamPartManager;
use std::sync::Arc;
use std::time::Duration;

/// Stream part state shared between the node and its tracker manager.
pub type SharedStreamParts = Arc<Mutex<StreamPartManager>>;

/// An instruction waiting for its topic's handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedInstruction {
    pub instruction: InstructionMessage,
    pub tracker_id: TrackerId,
}

/// Tracker manager configuration.
#[derive(Clone, Debug)]
pub struct TrackerManagerConfig {
    pub trackers: Vec<TrackerRecord>,
    /// Minimum time between status messages that carry RTTs, per tracker.
    pub rtt_update_interval: Duration,
    pub tracker_connection_maintenance_interval: Duration,
    pub instruction_retry_interval: Duration,
    /// Every `limit + 1`-th retry reports status even without changes.
    pub status_send_counter_limit: u64,
}

impl Default for TrackerManagerConfig {
    fn default() -> Self {
        Self {
            trackers: Vec::new(),
            rtt_update_interval: Duration::from_secs(15),
            tracker_connection_maintenance_interval: Duration::from_secs(5),
            instruction_retry_interval: Duration::from_secs(3 * 60),
            status_send_counter_limit: 9,
        }
    }
}

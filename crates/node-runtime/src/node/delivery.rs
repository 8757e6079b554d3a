//! Consecutive delivery failure tracking per neighbor.
//!
//! The logic layer can believe a neighbor is connected while the transport
//! knows it is not. After `threshold` failed sends in a row the node treats
//! the neighbor as disconnected.

use parking_lot::Mutex;
use shared_types::NodeId;
use std::collections::HashMap;

/// Failed sends in a row after which a neighbor is dropped.
pub const CONSECUTIVE_DELIVERY_FAILURE_LIMIT: u32 = 100;

#[derive(Debug)]
pub struct DeliveryFailures {
    threshold: u32,
    counts: Mutex<HashMap<NodeId, u32>>,
}

impl Default for DeliveryFailures {
    fn default() -> Self {
        Self::new(CONSECUTIVE_DELIVERY_FAILURE_LIMIT)
    }
}

impl DeliveryFailures {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold,
            counts: Mutex::new(HashMap::new()),
        }
    }

    pub fn record_success(&self, node_id: &NodeId) {
        self.counts.lock().remove(node_id);
    }

    /// Count a failed send. Returns true, and starts counting from zero
    /// again, when the threshold is reached.
    pub fn record_failure(&self, node_id: &NodeId) -> bool {
        let mut counts = self.counts.lock();
        let count = counts.entry(node_id.clone()).or_insert(0);
        *count += 1;
        if *count >= self.threshold {
            counts.remove(node_id);
            true
        } else {
            false
        }
    }

    pub fn consecutive_failures(&self, node_id: &NodeId) -> u32 {
        self.counts.lock().get(node_id).copied().unwrap_or(0)
    }
}

//! Per-topic overlay state.

use shared_types::NodeId;
use std::collections::{BTreeSet, HashMap};

use super::detector::DuplicateMessageDetector;
use super::number_pair::NumberPair;
use crate::events::DetectorError;

/// Detector key: `(publisher_id, msg_chain_id)`.
pub type ChainKey = (String, String);

/// State of one subscribed stream part.
#[derive(Debug, Clone)]
pub struct StreamPartEntry {
    /// Two-way gossip neighbors.
    pub neighbors: BTreeSet<NodeId>,
    /// One-way links feeding messages in.
    pub in_only: BTreeSet<NodeId>,
    /// One-way links messages are fed out to.
    pub out_only: BTreeSet<NodeId>,
    /// Last applied tracker instruction counter.
    pub counter: u64,
    /// Fixed at creation.
    pub is_behind_proxy: bool,
    detectors: HashMap<ChainKey, DuplicateMessageDetector>,
    max_number_of_gaps: usize,
}

impl StreamPartEntry {
    pub fn new(is_behind_proxy: bool, max_number_of_gaps: usize) -> Self {
        Self {
            neighbors: BTreeSet::new(),
            in_only: BTreeSet::new(),
            out_only: BTreeSet::new(),
            counter: 0,
            is_behind_proxy,
            detectors: HashMap::new(),
            max_number_of_gaps,
        }
    }

    /// Run duplicate detection, creating the chain's detector on first use.
    pub fn mark_and_check(
        &mut self,
        chain: ChainKey,
        previous: Option<NumberPair>,
        current: NumberPair,
    ) -> Result<bool, DetectorError> {
        let max = self.max_number_of_gaps;
        self.detectors
            .entry(chain)
            .or_insert_with(|| DuplicateMessageDetector::new(max))
            .mark_and_check(previous, current)
    }

    pub fn add_neighbor(&mut self, node: NodeId) {
        self.in_only.remove(&node);
        self.out_only.remove(&node);
        self.neighbors.insert(node);
    }

    pub fn add_in_only(&mut self, node: NodeId) {
        if !self.neighbors.contains(&node) {
            self.in_only.insert(node);
        }
    }

    pub fn add_out_only(&mut self, node: NodeId) {
        if !self.neighbors.contains(&node) {
            self.out_only.insert(node);
        }
    }

    /// Remove `node` from every set; true if it was a two-way neighbor.
    pub fn remove_node(&mut self, node: &NodeId) -> bool {
        self.in_only.remove(node);
        self.out_only.remove(node);
        self.neighbors.remove(node)
    }

    pub fn contains(&self, node: &NodeId) -> bool {
        self.neighbors.contains(node) || self.in_only.contains(node) || self.out_only.contains(node)
    }

    pub fn outbound(&self) -> Vec<NodeId> {
        self.neighbors.union(&self.out_only).cloned().collect()
    }

    pub fn inbound(&self) -> Vec<NodeId> {
        self.neighbors.union(&self.in_only).cloned().collect()
    }

    pub fn all_nodes(&self) -> Vec<NodeId> {
        let mut nodes: BTreeSet<&NodeId> = self.neighbors.iter().collect();
        nodes.extend(self.in_only.iter());
        nodes.extend(self.out_only.iter());
        nodes.into_iter().cloned().collect()
    }
}

//! # Stream Part Manager
//!
//! Owns every [`StreamPartEntry`] of the node. All accessors except
//! [`StreamPartManager::is_behind_proxy`] return
//! [`StreamPartError::NotSetUp`] for unknown topics.

use shared_types::{MessageId, MessageRef, NodeId, StreamPartId, StreamPartStatus};
use std::collections::{BTreeMap, BTreeSet};
use tracing::trace;

use crate::domain::{NumberPair, StreamPartEntry, DEFAULT_MAX_NUMBER_OF_GAPS};
use crate::events::StreamPartError;

/// Topics touched by a node removal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemovedNode {
    /// Topics where a two-way link was removed.
    pub changed: Vec<StreamPartId>,
    /// Behind-proxy topics; their one-way links were left in place.
    pub behind_proxy: Vec<StreamPartId>,
}

#[derive(Debug)]
pub struct StreamPartManager {
    stream_parts: BTreeMap<StreamPartId, StreamPartEntry>,
    max_number_of_gaps: usize,
}

impl StreamPartManager {
    pub fn new() -> Self {
        Self::with_max_number_of_gaps(DEFAULT_MAX_NUMBER_OF_GAPS)
    }

    pub fn with_max_number_of_gaps(max_number_of_gaps: usize) -> Self {
        Self {
            stream_parts: BTreeMap::new(),
            max_number_of_gaps,
        }
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    pub fn set_up_stream_part(
        &mut self,
        id: &StreamPartId,
        is_behind_proxy: bool,
    ) -> Result<(), StreamPartError> {
        if self.stream_parts.contains_key(id) {
            return Err(StreamPartError::AlreadySetUp(id.clone()));
        }
        self.stream_parts.insert(
            id.clone(),
            StreamPartEntry::new(is_behind_proxy, self.max_number_of_gaps),
        );
        trace!(stream_part_id = %id, is_behind_proxy, "Stream part set up");
        Ok(())
    }

    pub fn remove_stream_part(&mut self, id: &StreamPartId) -> Result<(), StreamPartError> {
        self.stream_parts
            .remove(id)
            .ok_or_else(|| StreamPartError::NotSetUp(id.clone()))?;
        trace!(stream_part_id = %id, "Stream part removed");
        Ok(())
    }

    pub fn is_set_up(&self, id: &StreamPartId) -> bool {
        self.stream_parts.contains_key(id)
    }

    /// True while no tracker instruction has been applied to the topic.
    pub fn is_new_stream(&self, id: &StreamPartId) -> Result<bool, StreamPartError> {
        Ok(self.entry(id)?.counter == 0)
    }

    pub fn update_counter(&mut self, id: &StreamPartId, counter: u64) -> Result<(), StreamPartError> {
        self.entry_mut(id)?.counter = counter;
        Ok(())
    }

    // =========================================================================
    // DUPLICATE DETECTION
    // =========================================================================

    /// Mark a message as seen; `Ok(true)` means it had not been seen before.
    pub fn mark_numbers_and_check_that_is_not_duplicate(
        &mut self,
        message_id: &MessageId,
        prev_msg_ref: Option<MessageRef>,
    ) -> Result<bool, StreamPartError> {
        let entry = self.entry_mut(&message_id.stream_part_id())?;
        let unseen = entry.mark_and_check(
            (message_id.publisher_id.clone(), message_id.msg_chain_id.clone()),
            prev_msg_ref.map(NumberPair::from),
            NumberPair::from(message_id.message_ref()),
        )?;
        Ok(unseen)
    }

    // =========================================================================
    // NEIGHBOR MUTATION
    // =========================================================================

    pub fn add_neighbor(&mut self, id: &StreamPartId, node: NodeId) -> Result<(), StreamPartError> {
        self.entry_mut(id)?.add_neighbor(node);
        Ok(())
    }

    pub fn add_in_only_neighbor(
        &mut self,
        id: &StreamPartId,
        node: NodeId,
    ) -> Result<(), StreamPartError> {
        self.entry_mut(id)?.add_in_only(node);
        Ok(())
    }

    pub fn add_out_only_neighbor(
        &mut self,
        id: &StreamPartId,
        node: NodeId,
    ) -> Result<(), StreamPartError> {
        self.entry_mut(id)?.add_out_only(node);
        Ok(())
    }

    pub fn remove_node_from_stream_part(
        &mut self,
        id: &StreamPartId,
        node: &NodeId,
    ) -> Result<(), StreamPartError> {
        self.entry_mut(id)?.remove_node(node);
        Ok(())
    }

    /// Drop `node` from every topic.
    ///
    /// One-way links on behind-proxy topics are owned by the proxy layer and
    /// stay in place; those topics are reported in `behind_proxy`.
    pub fn remove_node_from_all_stream_parts(&mut self, node: &NodeId) -> RemovedNode {
        let mut removed = RemovedNode::default();
        for (id, entry) in self.stream_parts.iter_mut() {
            if entry.neighbors.remove(node) {
                removed.changed.push(id.clone());
            }
            if entry.is_behind_proxy {
                removed.behind_proxy.push(id.clone());
            } else {
                entry.in_only.remove(node);
                entry.out_only.remove(node);
            }
        }
        removed
    }

    // =========================================================================
    // QUERIES
    // =========================================================================

    pub fn is_node_present(&self, node: &NodeId) -> bool {
        self.stream_parts.values().any(|entry| entry.contains(node))
    }

    /// Never fails: unknown topics are not behind a proxy.
    pub fn is_behind_proxy(&self, id: &StreamPartId) -> bool {
        self.stream_parts
            .get(id)
            .is_some_and(|entry| entry.is_behind_proxy)
    }

    pub fn get_stream_part_status(
        &self,
        id: &StreamPartId,
    ) -> Result<StreamPartStatus, StreamPartError> {
        let entry = self.entry(id)?;
        Ok(StreamPartStatus {
            id: id.stream_id.clone(),
            partition: id.partition,
            neighbors: entry.neighbors.iter().cloned().collect(),
            counter: i64::try_from(entry.counter).unwrap_or(i64::MAX),
        })
    }

    pub fn get_neighbors_for_stream_part(
        &self,
        id: &StreamPartId,
    ) -> Result<Vec<NodeId>, StreamPartError> {
        Ok(self.entry(id)?.neighbors.iter().cloned().collect())
    }

    /// Neighbors plus out-only links.
    pub fn get_outbound_nodes_for_stream_part(
        &self,
        id: &StreamPartId,
    ) -> Result<Vec<NodeId>, StreamPartError> {
        Ok(self.entry(id)?.outbound())
    }

    /// Neighbors plus in-only links.
    pub fn get_inbound_nodes_for_stream_part(
        &self,
        id: &StreamPartId,
    ) -> Result<Vec<NodeId>, StreamPartError> {
        Ok(self.entry(id)?.inbound())
    }

    pub fn get_all_nodes_for_stream_part(
        &self,
        id: &StreamPartId,
    ) -> Result<Vec<NodeId>, StreamPartError> {
        Ok(self.entry(id)?.all_nodes())
    }

    /// Distinct two-way neighbors across all topics.
    pub fn get_all_nodes(&self) -> Vec<NodeId> {
        self.stream_parts
            .values()
            .flat_map(|entry| entry.neighbors.iter())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn has_neighbor(&self, id: &StreamPartId, node: &NodeId) -> Result<bool, StreamPartError> {
        Ok(self.entry(id)?.neighbors.contains(node))
    }

    pub fn has_inbound_connection(
        &self,
        id: &StreamPartId,
        node: &NodeId,
    ) -> Result<bool, StreamPartError> {
        let entry = self.entry(id)?;
        Ok(entry.neighbors.contains(node) || entry.in_only.contains(node))
    }

    pub fn has_in_only_connection(
        &self,
        id: &StreamPartId,
        node: &NodeId,
    ) -> Result<bool, StreamPartError> {
        Ok(self.entry(id)?.in_only.contains(node))
    }

    pub fn has_out_only_connection(
        &self,
        id: &StreamPartId,
        node: &NodeId,
    ) -> Result<bool, StreamPartError> {
        Ok(self.entry(id)?.out_only.contains(node))
    }

    pub fn get_stream_parts(&self) -> Vec<StreamPartId> {
        self.stream_parts.keys().cloned().collect()
    }

    // =========================================================================
    // HELPER FUNCTIONS
    // =========================================================================

    fn entry(&self, id: &StreamPartId) -> Result<&StreamPartEntry, StreamPartError> {
        self.stream_parts
            .get(id)
            .ok_or_else(|| StreamPartError::NotSetUp(id.clone()))
    }

    fn entry_mut(&mut self, id: &StreamPartId) -> Result<&mut StreamPartEntry, StreamPartError> {
        self.stream_parts
            .get_mut(id)
            .ok_or_else(|| StreamPartError::NotSetUp(id.clone()))
    }
}

impl Default for StreamPartManager {
    fn default() -> Self {
        Self::new()
    }
}

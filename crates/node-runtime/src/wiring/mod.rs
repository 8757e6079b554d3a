//! # Subsystem Wiring
//!
//! Adapters implementing each subsystem's outbound ports on top of the node.
//!
//! ```text
//!                ┌──────────────────────────────────────────┐
//!                │                 NodeInner                │
//!                │  stream parts · transport · event bus    │
//!                └───────▲──────────────▲──────────────▲────┘
//!                        │ Weak         │ Weak         │ Arc (transport,
//!                        │              │              │      stream parts)
//!          ┌─────────────┴───┐ ┌────────┴────────┐ ┌───┴──────────────────┐
//!          │ PropagationSender│ │ NodeSubscriber  │ │ DisconnectionAdapter │
//!          │ (NeighborSender) │ │(TopologySubscr.)│ │ (DisconnectionPort)  │
//!          └────────▲─────────┘ └───────▲─────────┘ └──────────▲───────────┘
//!                   │                   │                      │
//!            sm-02 Propagation   sm-03 TrackerManager   DisconnectionManager
//! ```
//!
//! The subsystems are owned by `NodeInner`, so adapters that call back into
//! it hold a `Weak` reference and fail softly once the node is gone.

use async_trait::async_trait;
use shared_types::{NodeDescriptor, NodeId, StreamMessage, StreamPartId, TrackerId};
use sm_02_propagation::{NeighborSender, SendError};
use sm_03_tracker_sync::{SharedStreamParts, TopologySubscriber, TrackerSyncError};
use std::sync::{Arc, Weak};
use tracing::warn;

use crate::disconnection::DisconnectionPort;
use crate::errors::TransportError;
use crate::node::NodeInner;
use crate::ports::NodeToNode;

// =============================================================================
// NeighborSender Adapter (sm-02)
// =============================================================================

/// Sends propagated messages through the node's transport and counts
/// consecutive failures per neighbor.
pub struct PropagationSender {
    pub(crate) node: Weak<NodeInner>,
}

#[async_trait]
impl NeighborSender for PropagationSender {
    async fn send_to_neighbor(&self, neighbor: &NodeId, message: &StreamMessage) -> Result<(), SendError> {
        let node = self.node.upgrade().ok_or(SendError::Stopped)?;
        match node.transport.send_data(neighbor, message).await {
            Ok(()) => {
                node.delivery_failures.record_success(neighbor);
                Ok(())
            }
            Err(e) => {
                warn!(
                    message_id = %message.message_id,
                    neighbor = %neighbor,
                    consecutive_failures = node.delivery_failures.consecutive_failures(neighbor),
                    error = %e,
                    "Failed to propagate message"
                );
                if node.delivery_failures.record_failure(neighbor) {
                    warn!(
                        neighbor = %neighbor,
                        "Disconnecting neighbor after too many consecutive delivery failures"
                    );
                    node.on_node_disconnected(neighbor);
                }
                Err(match e {
                    TransportError::NotConnected(node_id) => SendError::NotConnected(node_id),
                    TransportError::Stopped => SendError::Stopped,
                    other => SendError::Failed {
                        neighbor: neighbor.clone(),
                        reason: other.to_string(),
                    },
                })
            }
        }
    }
}

// =============================================================================
// TopologySubscriber Adapter (sm-03)
// =============================================================================

/// Lets the tracker manager drive the node's per-topic neighbor sets.
pub struct NodeSubscriber {
    pub(crate) node: Weak<NodeInner>,
}

#[async_trait]
impl TopologySubscriber for NodeSubscriber {
    async fn subscribe_to_stream_part_on_nodes(
        &self,
        node_ids: &[NodeId],
        stream_part_id: &StreamPartId,
        tracker_id: &TrackerId,
        reattempt: bool,
    ) -> Vec<Result<NodeId, TrackerSyncError>> {
        match self.node.upgrade() {
            Some(node) => {
                node.subscribe_to_stream_part_on_nodes(node_ids, stream_part_id, tracker_id, reattempt)
                    .await
            }
            None => node_ids
                .iter()
                .map(|node_id| {
                    Err(TrackerSyncError::ConnectFailed {
                        node_id: node_id.clone(),
                        reason: "node dropped".to_string(),
                    })
                })
                .collect(),
        }
    }

    fn unsubscribe_from_stream_part_on_node(&self, node_id: &NodeId, stream_part_id: &StreamPartId) {
        if let Some(node) = self.node.upgrade() {
            node.unsubscribe_from_stream_part_on_node(node_id, stream_part_id, false);
        }
    }

    fn emit_join_completed(&self, stream_part_id: &StreamPartId, num_of_neighbors: usize) {
        if let Some(node) = self.node.upgrade() {
            node.emit_join_completed(stream_part_id, num_of_neighbors);
        }
    }

    fn emit_join_failed(&self, stream_part_id: &StreamPartId, reason: String) {
        if let Some(node) = self.node.upgrade() {
            node.emit_join_failed(stream_part_id, reason);
        }
    }

    fn node_descriptor(&self, include_rtt: bool) -> NodeDescriptor {
        self.node
            .upgrade()
            .map(|node| node.descriptor(include_rtt))
            .unwrap_or_default()
    }
}

// =============================================================================
// DisconnectionPort Adapter
// =============================================================================

/// Backs the disconnection manager with the transport's connection list and
/// the stream part manager's membership.
pub struct DisconnectionAdapter {
    pub(crate) transport: Arc<dyn NodeToNode>,
    pub(crate) stream_parts: SharedStreamParts,
}

impl DisconnectionPort for DisconnectionAdapter {
    fn get_all_node_ids(&self) -> Vec<NodeId> {
        self.transport.get_all_connection_node_ids()
    }

    fn has_shared_stream_parts(&self, node_id: &NodeId) -> bool {
        self.stream_parts.lock().is_node_present(node_id)
    }

    fn disconnect(&self, node_id: &NodeId, reason: &str) {
        let transport = Arc::clone(&self.transport);
        let node_id = node_id.clone();
        let reason = reason.to_string();
        tokio::spawn(async move {
            transport.disconnect_from_node(&node_id, &reason).await;
        });
    }
}

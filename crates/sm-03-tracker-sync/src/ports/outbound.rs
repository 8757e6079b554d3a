//! Outbound ports (SPI) for the Tracker Sync subsystem.

use async_trait::async_trait;
use shared_types::{
    InstructionMessage, NodeDescriptor, NodeId, StatusMessage, StreamPartId, TrackerId,
    TrackerRecord,
};
use tokio::sync::broadcast;

use crate::events::{NodeToTrackerEvent, TrackerSyncError, TrackerTransportError};

/// Connection to the tracker fleet.
#[async_trait]
pub trait NodeToTracker: Send + Sync + 'static {
    async fn send_status(
        &self,
        tracker_id: &TrackerId,
        status: StatusMessage,
    ) -> Result<(), TrackerTransportError>;

    /// Connect if not already connected.
    async fn connect_to_tracker(&self, tracker: &TrackerRecord) -> Result<(), TrackerTransportError>;

    /// Disconnect if connected.
    async fn disconnect_from_tracker(&self, tracker_id: &TrackerId);

    fn subscribe(&self) -> broadcast::Receiver<NodeToTrackerEvent>;

    async fn stop(&self);
}

/// Topology operations the tracker manager drives on the owning node.
#[async_trait]
pub trait TopologySubscriber: Send + Sync + 'static {
    /// Connect to and subscribe with every node, each independently.
    ///
    /// Returns one outcome per entry of `node_ids`, in order.
    async fn subscribe_to_stream_part_on_nodes(
        &self,
        node_ids: &[NodeId],
        stream_part_id: &StreamPartId,
        tracker_id: &TrackerId,
        reattempt: bool,
    ) -> Vec<Result<NodeId, TrackerSyncError>>;

    /// Drop a neighbor without reporting status.
    fn unsubscribe_from_stream_part_on_node(&self, node_id: &NodeId, stream_part_id: &StreamPartId);

    fn emit_join_completed(&self, stream_part_id: &StreamPartId, num_of_neighbors: usize);

    fn emit_join_failed(&self, stream_part_id: &StreamPartId, reason: String);

    fn node_descriptor(&self, include_rtt: bool) -> NodeDescriptor;
}

/// Applies one tracker instruction.
#[async_trait]
pub trait InstructionHandler: Send + Sync + 'static {
    async fn handle_instruction(
        &self,
        instruction: InstructionMessage,
        tracker_id: TrackerId,
        reattempt: bool,
    ) -> Result<(), TrackerSyncError>;
}

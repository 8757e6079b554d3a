//! # In-Memory Simulator
//!
//! Deterministic transports for running many nodes in one process.
//!
//! - [`SimulatedNetwork`] owns every node-to-node endpoint of one
//!   simulation. Networks are independent of each other; nothing is global.
//! - [`SimulatedNodeToNode`] delivers data through the receiving endpoint's
//!   event channel and mirrors connects and disconnects on both sides.
//! - [`SimulatedNodeToTracker`] stands in for the tracker fleet: it records
//!   every status sent and lets callers inject instructions and acks.

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use rand::Rng;
use shared_types::{
    InstructionMessage, NodeId, Rtts, StatusAckMessage, StatusMessage, StreamMessage, StreamPartId,
    TrackerId, TrackerRecord,
};
use sm_03_tracker_sync::{NodeToTracker, NodeToTrackerEvent, TrackerTransportError};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::broadcast;
use tracing::trace;

use crate::errors::TransportError;
use crate::ports::{NodeToNode, NodeToNodeEvent};

const EVENT_CHANNEL_CAPACITY: usize = 4096;

/// Simulated link RTT range in milliseconds.
const RTT_RANGE_MS: std::ops::RangeInclusive<u64> = 1..=50;

// =============================================================================
// Node-to-node
// =============================================================================

/// One simulated network.
#[derive(Clone, Default)]
pub struct SimulatedNetwork {
    inner: Arc<NetworkInner>,
}

#[derive(Default)]
struct NetworkInner {
    endpoints: RwLock<HashMap<NodeId, Arc<SimulatedNodeToNode>>>,
    unreachable: RwLock<HashSet<NodeId>>,
}

impl SimulatedNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the endpoint of `node_id`, replacing any previous one.
    pub fn add_node(&self, node_id: NodeId) -> Arc<SimulatedNodeToNode> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let endpoint = Arc::new(SimulatedNodeToNode {
            node_id: node_id.clone(),
            network: Arc::downgrade(&self.inner),
            connections: Mutex::new(HashMap::new()),
            events,
            stopped: AtomicBool::new(false),
        });
        self.inner
            .endpoints
            .write()
            .insert(node_id, Arc::clone(&endpoint));
        endpoint
    }

    /// Refuse new connections to and from `node_id`.
    pub fn set_unreachable(&self, node_id: &NodeId, unreachable: bool) {
        let mut set = self.inner.unreachable.write();
        if unreachable {
            set.insert(node_id.clone());
        } else {
            set.remove(node_id);
        }
    }

    pub fn is_connected(&self, a: &NodeId, b: &NodeId) -> bool {
        self.inner
            .endpoint(a)
            .is_some_and(|endpoint| endpoint.connections.lock().contains_key(b))
    }

    pub fn endpoint(&self, node_id: &NodeId) -> Option<Arc<SimulatedNodeToNode>> {
        self.inner.endpoint(node_id)
    }
}

impl NetworkInner {
    fn endpoint(&self, node_id: &NodeId) -> Option<Arc<SimulatedNodeToNode>> {
        self.endpoints.read().get(node_id).cloned()
    }

    fn is_unreachable(&self, node_id: &NodeId) -> bool {
        self.unreachable.read().contains(node_id)
    }
}

/// The simulated transport of one node.
pub struct SimulatedNodeToNode {
    node_id: NodeId,
    network: Weak<NetworkInner>,
    /// Connected peers and their link RTT in milliseconds.
    connections: Mutex<HashMap<NodeId, u64>>,
    events: broadcast::Sender<NodeToNodeEvent>,
    stopped: AtomicBool,
}

impl SimulatedNodeToNode {
    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    fn emit(&self, event: NodeToNodeEvent) {
        // No receiver just means the owning node has not started yet.
        let _ = self.events.send(event);
    }

    /// Drop the link on this side only.
    fn drop_link(&self, peer: &NodeId) -> bool {
        let removed = self.connections.lock().remove(peer).is_some();
        if removed {
            self.emit(NodeToNodeEvent::NodeDisconnected(peer.clone()));
        }
        removed
    }
}

#[async_trait]
impl NodeToNode for SimulatedNodeToNode {
    async fn connect_to_node(
        &self,
        node_id: &NodeId,
        _tracker_id: &TrackerId,
        _tracker_instructed: bool,
    ) -> Result<NodeId, TransportError> {
        if self.is_stopped() {
            return Err(TransportError::Stopped);
        }
        if self.connections.lock().contains_key(node_id) {
            return Ok(node_id.clone());
        }
        let network = self.network.upgrade().ok_or(TransportError::Stopped)?;
        let peer = network
            .endpoint(node_id)
            .filter(|_| *node_id != self.node_id)
            .ok_or_else(|| TransportError::UnknownNode(node_id.clone()))?;
        if peer.is_stopped() || network.is_unreachable(node_id) || network.is_unreachable(&self.node_id) {
            return Err(TransportError::ConnectFailed {
                node_id: node_id.clone(),
                reason: "unreachable".to_string(),
            });
        }

        let rtt = rand::thread_rng().gen_range(RTT_RANGE_MS);
        self.connections.lock().insert(node_id.clone(), rtt);
        peer.connections.lock().insert(self.node_id.clone(), rtt);
        self.emit(NodeToNodeEvent::NodeConnected(node_id.clone()));
        peer.emit(NodeToNodeEvent::NodeConnected(self.node_id.clone()));
        trace!(from = %self.node_id, to = %node_id, rtt, "Simulated connection established");
        Ok(node_id.clone())
    }

    async fn send_data(&self, node_id: &NodeId, message: &StreamMessage) -> Result<(), TransportError> {
        if self.is_stopped() {
            return Err(TransportError::Stopped);
        }
        if !self.connections.lock().contains_key(node_id) {
            return Err(TransportError::NotConnected(node_id.clone()));
        }
        let peer = self
            .network
            .upgrade()
            .and_then(|network| network.endpoint(node_id))
            .ok_or_else(|| TransportError::UnknownNode(node_id.clone()))?;
        peer.emit(NodeToNodeEvent::DataReceived {
            message: message.clone(),
            source: self.node_id.clone(),
        });
        Ok(())
    }

    async fn disconnect_from_node(&self, node_id: &NodeId, reason: &str) {
        if self.drop_link(node_id) {
            trace!(from = %self.node_id, to = %node_id, reason, "Simulated connection closed");
            if let Some(peer) = self.network.upgrade().and_then(|n| n.endpoint(node_id)) {
                peer.drop_link(&self.node_id);
            }
        }
    }

    fn get_rtts(&self) -> Rtts {
        self.connections
            .lock()
            .iter()
            .map(|(node_id, rtt)| (node_id.clone(), *rtt))
            .collect()
    }

    fn get_all_connection_node_ids(&self) -> Vec<NodeId> {
        self.connections.lock().keys().cloned().collect()
    }

    fn subscribe(&self) -> broadcast::Receiver<NodeToNodeEvent> {
        self.events.subscribe()
    }

    async fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        let peers: Vec<NodeId> = self.connections.lock().drain().map(|(id, _)| id).collect();
        let network = self.network.upgrade();
        for peer_id in peers {
            if let Some(peer) = network.as_ref().and_then(|n| n.endpoint(&peer_id)) {
                peer.drop_link(&self.node_id);
            }
        }
    }
}

// =============================================================================
// Node-to-tracker
// =============================================================================

/// The simulated tracker connection of one node.
pub struct SimulatedNodeToTracker {
    connected: Mutex<HashSet<TrackerId>>,
    statuses: Mutex<Vec<(TrackerId, StatusMessage)>>,
    events: broadcast::Sender<NodeToTrackerEvent>,
    stopped: AtomicBool,
}

impl Default for SimulatedNodeToTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedNodeToTracker {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            connected: Mutex::new(HashSet::new()),
            statuses: Mutex::new(Vec::new()),
            events,
            stopped: AtomicBool::new(false),
        }
    }

    /// Deliver an instruction as if `tracker_id` had sent it.
    pub fn inject_instruction(&self, instruction: InstructionMessage, tracker_id: TrackerId) {
        let _ = self.events.send(NodeToTrackerEvent::InstructionReceived {
            instruction,
            tracker_id,
        });
    }

    pub fn inject_status_ack(&self, stream_part_id: &StreamPartId, tracker_id: TrackerId) {
        let _ = self.events.send(NodeToTrackerEvent::StatusAckReceived {
            ack: StatusAckMessage::new(stream_part_id),
            tracker_id,
        });
    }

    /// Every status sent so far, oldest first.
    pub fn statuses(&self) -> Vec<(TrackerId, StatusMessage)> {
        self.statuses.lock().clone()
    }

    pub fn statuses_for(&self, stream_part_id: &StreamPartId) -> Vec<StatusMessage> {
        self.statuses
            .lock()
            .iter()
            .filter(|(_, status)| {
                status.stream_part.id == stream_part_id.stream_id
                    && status.stream_part.partition == stream_part_id.partition
            })
            .map(|(_, status)| status.clone())
            .collect()
    }

    pub fn is_connected(&self, tracker_id: &TrackerId) -> bool {
        self.connected.lock().contains(tracker_id)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NodeToTracker for SimulatedNodeToTracker {
    async fn send_status(&self, tracker_id: &TrackerId, status: StatusMessage) -> Result<(), TrackerTransportError> {
        if self.is_stopped() {
            return Err(TrackerTransportError::Stopped);
        }
        if !self.is_connected(tracker_id) {
            return Err(TrackerTransportError::NotConnected(tracker_id.clone()));
        }
        self.statuses.lock().push((tracker_id.clone(), status));
        Ok(())
    }

    async fn connect_to_tracker(&self, tracker: &TrackerRecord) -> Result<(), TrackerTransportError> {
        if self.is_stopped() {
            return Err(TrackerTransportError::Stopped);
        }
        if self.connected.lock().insert(tracker.id.clone()) {
            let _ = self
                .events
                .send(NodeToTrackerEvent::ConnectedToTracker(tracker.id.clone()));
        }
        Ok(())
    }

    async fn disconnect_from_tracker(&self, tracker_id: &TrackerId) {
        if self.connected.lock().remove(tracker_id) {
            let _ = self
                .events
                .send(NodeToTrackerEvent::TrackerDisconnected(tracker_id.clone()));
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<NodeToTrackerEvent> {
        self.events.subscribe()
    }

    async fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.connected.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::{MessageId, StreamMessageContent};

    fn message() -> StreamMessage {
        StreamMessage {
            message_id: MessageId {
                stream_id: "s".to_string(),
                stream_partition: 0,
                timestamp: 1,
                sequence_number: 0,
                publisher_id: "p".to_string(),
                msg_chain_id: "c".to_string(),
            },
            prev_msg_ref: None,
            content: StreamMessageContent::Data {
                payload: b"hi".to_vec(),
            },
        }
    }

    fn tracker() -> TrackerId {
        TrackerId::from("t0")
    }

    // =========================================================================
    // NODE-TO-NODE
    // =========================================================================

    #[tokio::test]
    async fn test_connect_is_mirrored_on_both_sides() {
        let network = SimulatedNetwork::new();
        let a = network.add_node(NodeId::from("a"));
        let b = network.add_node(NodeId::from("b"));
        let mut b_events = b.subscribe();

        let connected = a.connect_to_node(&NodeId::from("b"), &tracker(), true).await;

        assert_eq!(connected, Ok(NodeId::from("b")));
        assert!(network.is_connected(&NodeId::from("a"), &NodeId::from("b")));
        assert!(network.is_connected(&NodeId::from("b"), &NodeId::from("a")));
        assert_eq!(
            b_events.try_recv().unwrap(),
            NodeToNodeEvent::NodeConnected(NodeId::from("a"))
        );
        assert_eq!(
            a.get_rtts().get(&NodeId::from("b")),
            b.get_rtts().get(&NodeId::from("a"))
        );
    }

    #[tokio::test]
    async fn test_send_requires_connection() {
        let network = SimulatedNetwork::new();
        let a = network.add_node(NodeId::from("a"));
        let b = network.add_node(NodeId::from("b"));
        let mut b_events = b.subscribe();

        assert_eq!(
            a.send_data(&NodeId::from("b"), &message()).await,
            Err(TransportError::NotConnected(NodeId::from("b")))
        );

        a.connect_to_node(&NodeId::from("b"), &tracker(), true).await.unwrap();
        a.send_data(&NodeId::from("b"), &message()).await.unwrap();

        let events: Vec<NodeToNodeEvent> = std::iter::from_fn(|| b_events.try_recv().ok()).collect();
        assert_eq!(
            events.last(),
            Some(&NodeToNodeEvent::DataReceived {
                message: message(),
                source: NodeId::from("a"),
            })
        );
    }

    #[tokio::test]
    async fn test_unreachable_and_unknown_nodes() {
        let network = SimulatedNetwork::new();
        let a = network.add_node(NodeId::from("a"));
        network.add_node(NodeId::from("b"));
        network.set_unreachable(&NodeId::from("b"), true);

        assert!(matches!(
            a.connect_to_node(&NodeId::from("b"), &tracker(), true).await,
            Err(TransportError::ConnectFailed { .. })
        ));
        assert_eq!(
            a.connect_to_node(&NodeId::from("zz"), &tracker(), true).await,
            Err(TransportError::UnknownNode(NodeId::from("zz")))
        );

        network.set_unreachable(&NodeId::from("b"), false);
        assert!(a.connect_to_node(&NodeId::from("b"), &tracker(), true).await.is_ok());
    }

    #[tokio::test]
    async fn test_disconnect_and_stop_close_both_sides() {
        let network = SimulatedNetwork::new();
        let a = network.add_node(NodeId::from("a"));
        let b = network.add_node(NodeId::from("b"));
        let c = network.add_node(NodeId::from("c"));
        a.connect_to_node(&NodeId::from("b"), &tracker(), true).await.unwrap();
        a.connect_to_node(&NodeId::from("c"), &tracker(), true).await.unwrap();
        let mut b_events = b.subscribe();

        a.disconnect_from_node(&NodeId::from("b"), "test").await;
        assert!(!network.is_connected(&NodeId::from("b"), &NodeId::from("a")));
        assert_eq!(
            b_events.try_recv().unwrap(),
            NodeToNodeEvent::NodeDisconnected(NodeId::from("a"))
        );

        a.stop().await;
        assert!(c.get_all_connection_node_ids().is_empty());
        assert_eq!(
            a.connect_to_node(&NodeId::from("b"), &tracker(), true).await,
            Err(TransportError::Stopped)
        );
    }

    // =========================================================================
    // NODE-TO-TRACKER
    // =========================================================================

    #[tokio::test]
    async fn test_tracker_connection_events_and_statuses() {
        let transport = SimulatedNodeToTracker::new();
        let mut events = transport.subscribe();
        let record = TrackerRecord::new("t0", "ws://t0", "http://t0");
        let status = StatusMessage {
            stream_part: shared_types::StreamPartStatus::unsubscribed(&StreamPartId::new("s", 0)),
            descriptor: Default::default(),
        };

        assert_eq!(
            transport.send_status(&tracker(), status.clone()).await,
            Err(TrackerTransportError::NotConnected(tracker()))
        );

        transport.connect_to_tracker(&record).await.unwrap();
        transport.connect_to_tracker(&record).await.unwrap();
        transport.send_status(&tracker(), status.clone()).await.unwrap();
        transport.disconnect_from_tracker(&tracker()).await;

        assert_eq!(events.try_recv().unwrap(), NodeToTrackerEvent::ConnectedToTracker(tracker()));
        assert_eq!(events.try_recv().unwrap(), NodeToTrackerEvent::TrackerDisconnected(tracker()));
        assert_eq!(transport.statuses(), vec![(tracker(), status.clone())]);
        assert_eq!(transport.statuses_for(&StreamPartId::new("s", 0)), vec![status]);
    }
}

//! Outbound ports (SPI) for the node runtime.

use async_trait::async_trait;
use shared_types::{NodeId, Rtts, StreamMessage, StreamPartId, TrackerId};
use tokio::sync::broadcast;

use crate::errors::TransportError;

/// Events emitted by the node-to-node transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeToNodeEvent {
    NodeConnected(NodeId),
    NodeDisconnected(NodeId),
    DataReceived {
        message: StreamMessage,
        source: NodeId,
    },
}

/// Peer connections of one node.
///
/// Implementations may be WebRTC, WebSocket or the in-memory simulator; the
/// node only depends on this capability set.
#[async_trait]
pub trait NodeToNode: Send + Sync + 'static {
    /// Connect to `node_id`, brokered by `tracker_id`.
    ///
    /// Resolves with the connected node's id. Connecting to an already
    /// connected node succeeds immediately.
    async fn connect_to_node(
        &self,
        node_id: &NodeId,
        tracker_id: &TrackerId,
        tracker_instructed: bool,
    ) -> Result<NodeId, TransportError>;

    /// Resolves on local handoff, not on end-to-end delivery.
    async fn send_data(&self, node_id: &NodeId, message: &StreamMessage) -> Result<(), TransportError>;

    async fn disconnect_from_node(&self, node_id: &NodeId, reason: &str);

    /// Round-trip times to connected peers, in milliseconds.
    fn get_rtts(&self) -> Rtts;

    fn get_all_connection_node_ids(&self) -> Vec<NodeId>;

    fn subscribe(&self) -> broadcast::Receiver<NodeToNodeEvent>;

    async fn stop(&self);
}

/// Direction of a one-way proxy link, seen from the client side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProxyDirection {
    Publish,
    Subscribe,
}

/// The proxy connection layer (client and server halves).
///
/// The core only sees its effect on in-only and out-only neighbor sets; this
/// port covers the few queries the node makes back into it.
pub trait ProxyConnections: Send + Sync + 'static {
    /// Proxy clients on `stream_part_id` acting for `user_id`.
    fn node_ids_for_user(&self, stream_part_id: &StreamPartId, user_id: &str) -> Vec<NodeId>;

    fn is_proxied_stream_part(&self, stream_part_id: &StreamPartId, direction: ProxyDirection) -> bool;

    /// Forget a one-way link whose node went away.
    fn remove_connection(&self, stream_part_id: &StreamPartId, node_id: &NodeId);

    fn stop(&self);
}

/// Proxy layer for nodes that neither use nor serve proxies.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProxyConnections;

impl ProxyConnections for NoProxyConnections {
    fn node_ids_for_user(&self, _stream_part_id: &StreamPartId, _user_id: &str) -> Vec<NodeId> {
        Vec::new()
    }

    fn is_proxied_stream_part(&self, _stream_part_id: &StreamPartId, _direction: ProxyDirection) -> bool {
        false
    }

    fn remove_connection(&self, _stream_part_id: &StreamPartId, _node_id: &NodeId) {}

    fn stop(&self) {}
}

//! Error types for the node runtime.

use shared_types::{NodeId, StreamPartId};
use sm_01_stream_parts::StreamPartError;
use sm_03_tracker_sync::TrackerSyncError;
use thiserror::Error;

use crate::container::ConfigError;

/// Node-to-node transport failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Not connected to node {0}")]
    NotConnected(NodeId),

    #[error("Unknown node {0}")]
    UnknownNode(NodeId),

    #[error("Connecting to {node_id} failed: {reason}")]
    ConnectFailed { node_id: NodeId, reason: String },

    #[error("Sending to {node_id} failed: {reason}")]
    SendFailed { node_id: NodeId, reason: String },

    #[error("Transport stopped")]
    Stopped,
}

/// Node-level errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NodeError {
    #[error(transparent)]
    StreamPart(#[from] StreamPartError),

    #[error(transparent)]
    TrackerSync(#[from] TrackerSyncError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Join operation for stream part {0} timed out")]
    JoinTimeout(StreamPartId),

    #[error("Join operation for stream part {stream_part_id} failed: {reason}")]
    JoinFailed {
        stream_part_id: StreamPartId,
        reason: String,
    },

    #[error("Node already stopped")]
    AlreadyStopped,

    #[error("Node event bus closed")]
    EventBusClosed,

    #[error("Cannot publish to stream part {0}, it is proxied for subscribing only")]
    PublishToProxiedSubscribe(StreamPartId),
}

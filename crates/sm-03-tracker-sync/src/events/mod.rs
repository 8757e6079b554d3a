//! Events and error types for the Tracker Sync subsystem.

use shared_types::{InstructionMessage, NodeId, StatusAckMessage, TrackerId};
use sm_01_stream_parts::StreamPartError;
use thiserror::Error;

/// Events emitted by the node-to-tracker transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeToTrackerEvent {
    InstructionReceived {
        instruction: InstructionMessage,
        tracker_id: TrackerId,
    },
    StatusAckReceived {
        ack: StatusAckMessage,
        tracker_id: TrackerId,
    },
    ConnectedToTracker(TrackerId),
    TrackerDisconnected(TrackerId),
}

/// Tracker transport failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrackerTransportError {
    #[error("Not connected to tracker {0}")]
    NotConnected(TrackerId),

    #[error("Unknown tracker {0}")]
    UnknownTracker(TrackerId),

    #[error("Tracker transport stopped")]
    Stopped,
}

/// Tracker sync errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrackerSyncError {
    #[error("Tracker registry must contain at least one tracker")]
    NoTrackers,

    #[error("Connecting to node {node_id} failed: {reason}")]
    ConnectFailed { node_id: NodeId, reason: String },

    #[error("Connecting to node {0} timed out")]
    ConnectTimeout(NodeId),

    #[error(transparent)]
    StreamPart(#[from] StreamPartError),

    #[error(transparent)]
    Transport(#[from] TrackerTransportError),
}

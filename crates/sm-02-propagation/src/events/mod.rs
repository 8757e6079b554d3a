//! Error types for the Propagation subsystem.

use shared_types::NodeId;
use thiserror::Error;

/// Failure to hand a message to a neighbor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    #[error("Not connected to neighbor {0}")]
    NotConnected(NodeId),

    #[error("Send to {neighbor} failed: {reason}")]
    Failed { neighbor: NodeId, reason: String },

    #[error("Node stopped")]
    Stopped,
}

//! Outbound ports (SPI) for the Propagation subsystem.

use async_trait::async_trait;
use shared_types::{NodeId, StreamMessage};

use crate::events::SendError;

/// Delivers one message to one neighbor.
///
/// Resolves when the transport has taken the message, not on end-to-end
/// acknowledgement.
#[async_trait]
pub trait NeighborSender: Send + Sync + 'static {
    async fn send_to_neighbor(
        &self,
        neighbor: &NodeId,
        message: &StreamMessage,
    ) -> Result<(), SendError>;
}

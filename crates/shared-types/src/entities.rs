//! # Core Domain Entities
//!
//! ## Clusters
//!
//! - **Identity**: `NodeId`, `TrackerId`, `StreamPartId`
//! - **Messages**: `MessageId`, `MessageRef`, `StreamMessage`, `StreamMessageContent`

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::IdParseError;

// =============================================================================
// CLUSTER A: IDENTITY
// =============================================================================

/// Opaque identifier of a peer in the overlay.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Opaque identifier of a tracker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct TrackerId(pub String);

impl TrackerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrackerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TrackerId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// A stream partition: the unit of subscription in the overlay.
///
/// Rendered as `<stream_id>#<partition>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamPartId {
    pub stream_id: String,
    pub partition: u32,
}

impl StreamPartId {
    pub fn new(stream_id: impl Into<String>, partition: u32) -> Self {
        Self {
            stream_id: stream_id.into(),
            partition,
        }
    }
}

impl fmt::Display for StreamPartId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.stream_id, self.partition)
    }
}

impl FromStr for StreamPartId {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (stream_id, partition) = s
            .rsplit_once('#')
            .ok_or_else(|| IdParseError::MissingSeparator(s.to_string()))?;
        if stream_id.is_empty() {
            return Err(IdParseError::EmptyStreamId);
        }
        let partition = partition
            .parse()
            .map_err(|_| IdParseError::InvalidPartition(s.to_string()))?;
        Ok(Self::new(stream_id, partition))
    }
}

// =============================================================================
// CLUSTER B: MESSAGES
// =============================================================================

/// Position of a message within its publisher's chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRef {
    pub timestamp: u64,
    pub sequence_number: u64,
}

impl MessageRef {
    pub fn new(timestamp: u64, sequence_number: u64) -> Self {
        Self {
            timestamp,
            sequence_number,
        }
    }
}

/// Full identity of a published message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageId {
    pub stream_id: String,
    pub stream_partition: u32,
    pub timestamp: u64,
    pub sequence_number: u64,
    pub publisher_id: String,
    pub msg_chain_id: String,
}

impl MessageId {
    pub fn stream_part_id(&self) -> StreamPartId {
        StreamPartId::new(self.stream_id.clone(), self.stream_partition)
    }

    pub fn message_ref(&self) -> MessageRef {
        MessageRef::new(self.timestamp, self.sequence_number)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}|{}|{}|{}|{}|{}",
            self.stream_id,
            self.stream_partition,
            self.timestamp,
            self.sequence_number,
            self.publisher_id,
            self.msg_chain_id
        )
    }
}

/// Message payload.
///
/// Key-exchange messages carry the user id of their intended recipient so
/// proxy servers can route them point-to-point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum StreamMessageContent {
    Data { payload: Vec<u8> },
    GroupKeyRequest { recipient: String },
    GroupKeyResponse { recipient: String },
}

/// A message travelling through the overlay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamMessage {
    pub message_id: MessageId,
    pub prev_msg_ref: Option<MessageRef>,
    pub content: StreamMessageContent,
}

impl StreamMessage {
    pub fn stream_part_id(&self) -> StreamPartId {
        self.message_id.stream_part_id()
    }

    /// True for regular content messages (not key exchange).
    pub fn is_content(&self) -> bool {
        matches!(self.content, StreamMessageContent::Data { .. })
    }

    /// Recipient of a key-exchange message, if this is one.
    pub fn group_key_recipient(&self) -> Option<&str> {
        match &self.content {
            StreamMessageContent::GroupKeyRequest { recipient }
            | StreamMessageContent::GroupKeyResponse { recipient } => Some(recipient),
            StreamMessageContent::Data { .. } => None,
        }
    }

    pub fn payload_len(&self) -> usize {
        match &self.content {
            StreamMessageContent::Data { payload } => payload.len(),
            StreamMessageContent::GroupKeyRequest { recipient }
            | StreamMessageContent::GroupKeyResponse { recipient } => recipient.len(),
        }
    }
}

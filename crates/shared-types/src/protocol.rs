//! # Tracker Protocol
//!
//! Messages exchanged between a node and its trackers.
//!
//! ```text
//! Node ──StatusMessage──────→ Tracker
//! Node ←──InstructionMessage── Tracker
//! Node ←──StatusAckMessage──── Tracker
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::entities::{NodeId, StreamPartId, TrackerId};

/// Round-trip times to connected peers, in milliseconds.
pub type Rtts = BTreeMap<NodeId, u64>;

/// Free-form node metadata reported to trackers.
pub type ExtraMetadata = serde_json::Map<String, serde_json::Value>;

/// Tracker command: converge the neighbor set of one stream part.
///
/// `counter` increases monotonically per stream part; a node never applies
/// an instruction older than the one it last applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstructionMessage {
    pub stream_id: String,
    pub stream_partition: u32,
    pub node_ids: Vec<NodeId>,
    pub counter: u64,
}

impl InstructionMessage {
    pub fn new(stream_part_id: &StreamPartId, node_ids: Vec<NodeId>, counter: u64) -> Self {
        Self {
            stream_id: stream_part_id.stream_id.clone(),
            stream_partition: stream_part_id.partition,
            node_ids,
            counter,
        }
    }

    pub fn stream_part_id(&self) -> StreamPartId {
        StreamPartId::new(self.stream_id.clone(), self.stream_partition)
    }
}

/// Tracker acknowledgement of a status message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusAckMessage {
    pub stream_id: String,
    pub stream_partition: u32,
}

impl StatusAckMessage {
    pub fn new(stream_part_id: &StreamPartId) -> Self {
        Self {
            stream_id: stream_part_id.stream_id.clone(),
            stream_partition: stream_part_id.partition,
        }
    }

    pub fn stream_part_id(&self) -> StreamPartId {
        StreamPartId::new(self.stream_id.clone(), self.stream_partition)
    }
}

/// Status counter telling a tracker the node has left the stream part.
pub const COUNTER_UNSUBSCRIBE: i64 = -1;

/// Local view of one stream part, as reported to its tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamPartStatus {
    pub id: String,
    pub partition: u32,
    pub neighbors: Vec<NodeId>,
    pub counter: i64,
}

impl StreamPartStatus {
    /// Status of a stream part the node is no longer part of.
    pub fn unsubscribed(stream_part_id: &StreamPartId) -> Self {
        Self {
            id: stream_part_id.stream_id.clone(),
            partition: stream_part_id.partition,
            neighbors: Vec::new(),
            counter: COUNTER_UNSUBSCRIBE,
        }
    }
}

/// Geographic hint attached to status messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
}

/// Node-level fields sent along with every stream part status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct NodeDescriptor {
    pub started: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    pub extra: ExtraMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rtts: Option<Rtts>,
}

/// Status report for one stream part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusMessage {
    pub stream_part: StreamPartStatus,
    #[serde(flatten)]
    pub descriptor: NodeDescriptor,
}

/// A tracker known to the node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerRecord {
    pub id: TrackerId,
    pub ws: String,
    pub http: String,
}

impl TrackerRecord {
    pub fn new(id: impl Into<String>, ws: impl Into<String>, http: impl Into<String>) -> Self {
        Self {
            id: TrackerId::new(id),
            ws: ws.into(),
            http: http.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_instruction_wire_shape() {
        let instruction = InstructionMessage::new(
            &StreamPartId::new("stream", 2),
            vec![NodeId::from("a"), NodeId::from("b")],
            5,
        );
        let value = serde_json::to_value(&instruction).unwrap();
        assert_eq!(
            value,
            json!({
                "streamId": "stream",
                "streamPartition": 2,
                "nodeIds": ["a", "b"],
                "counter": 5
            })
        );
        assert_eq!(instruction.stream_part_id(), StreamPartId::new("stream", 2));
    }

    #[test]
    fn test_status_wire_shape_omits_missing_optionals() {
        let status = StatusMessage {
            stream_part: StreamPartStatus {
                id: "stream".into(),
                partition: 0,
                neighbors: vec![NodeId::from("n1")],
                counter: 3,
            },
            descriptor: NodeDescriptor {
                started: "2024-01-01T00:00:00Z".into(),
                location: None,
                extra: ExtraMetadata::new(),
                rtts: None,
            },
        };
        let value = serde_json::to_value(&status).unwrap();
        assert_eq!(
            value,
            json!({
                "streamPart": {"id": "stream", "partition": 0, "neighbors": ["n1"], "counter": 3},
                "started": "2024-01-01T00:00:00Z",
                "extra": {}
            })
        );
    }

    #[test]
    fn test_status_wire_shape_with_rtts() {
        let mut rtts = Rtts::new();
        rtts.insert(NodeId::from("n1"), 42);
        let descriptor = NodeDescriptor {
            started: "t".into(),
            location: Some(Location {
                country: Some("FI".into()),
                ..Location::default()
            }),
            extra: ExtraMetadata::new(),
            rtts: Some(rtts),
        };
        let value = serde_json::to_value(&descriptor).unwrap();
        assert_eq!(value["rtts"], json!({"n1": 42}));
        assert_eq!(value["location"], json!({"country": "FI"}));
    }

    #[test]
    fn test_unsubscribed_status_uses_negative_counter() {
        let status = StreamPartStatus::unsubscribed(&StreamPartId::new("s", 1));
        assert_eq!(status.counter, COUNTER_UNSUBSCRIBE);
        assert!(status.neighbors.is_empty());
        assert_eq!(status.partition, 1);
    }
}

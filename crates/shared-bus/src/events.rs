//! # Node Events
//!
//! Every event a node produces for client-facing consumers.

use serde::{Deserialize, Serialize};
use shared_types::{NodeId, StreamMessage, StreamPartId};

/// All events that can be published to the event bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeEvent {
    // =========================================================================
    // CONNECTIONS
    // =========================================================================
    /// A transport connection to a peer was established.
    NodeConnected(NodeId),

    /// A transport connection to a peer was lost or closed.
    NodeDisconnected(NodeId),

    // =========================================================================
    // MESSAGES
    // =========================================================================
    /// A message for a set-up stream part arrived, before deduplication.
    /// `source` is `None` for locally published messages.
    MessageReceived {
        message: StreamMessage,
        source: Option<NodeId>,
    },

    /// A message was seen for the first time and is being propagated.
    UnseenMessageReceived {
        message: StreamMessage,
        source: Option<NodeId>,
    },

    /// A message had already been seen.
    DuplicateMessageReceived {
        message: StreamMessage,
        source: Option<NodeId>,
    },

    // =========================================================================
    // SUBSCRIPTIONS
    // =========================================================================
    /// A peer became a two-way neighbor on a stream part.
    NodeSubscribed {
        node_id: NodeId,
        stream_part_id: StreamPartId,
    },

    /// A peer stopped being a neighbor on a stream part.
    NodeUnsubscribed {
        node_id: NodeId,
        stream_part_id: StreamPartId,
    },

    /// A proxy (one-way) link on a stream part was closed.
    OneWayConnectionClosed {
        node_id: NodeId,
        stream_part_id: StreamPartId,
    },

    // =========================================================================
    // JOIN OPERATIONS
    // =========================================================================
    /// The first instruction for a stream part was applied.
    JoinCompleted {
        stream_part_id: StreamPartId,
        num_of_neighbors: usize,
    },

    /// The first instruction for a stream part reached no neighbor.
    JoinFailed {
        stream_part_id: StreamPartId,
        reason: String,
    },
}

impl NodeEvent {
    /// Get the topic for this event (for filtering).
    #[must_use]
    pub fn topic(&self) -> EventTopic {
        match self {
            Self::NodeConnected(_) | Self::NodeDisconnected(_) => EventTopic::Connections,
            Self::MessageReceived { .. }
            | Self::UnseenMessageReceived { .. }
            | Self::DuplicateMessageReceived { .. } => EventTopic::Messages,
            Self::NodeSubscribed { .. }
            | Self::NodeUnsubscribed { .. }
            | Self::OneWayConnectionClosed { .. } => EventTopic::Subscriptions,
            Self::JoinCompleted { .. } | Self::JoinFailed { .. } => EventTopic::JoinOperations,
        }
    }

    /// The stream part the event concerns, if any.
    #[must_use]
    pub fn stream_part_id(&self) -> Option<StreamPartId> {
        match self {
            Self::NodeConnected(_) | Self::NodeDisconnected(_) => None,
            Self::MessageReceived { message, .. }
            | Self::UnseenMessageReceived { message, .. }
            | Self::DuplicateMessageReceived { message, .. } => Some(message.stream_part_id()),
            Self::NodeSubscribed { stream_part_id, .. }
            | Self::NodeUnsubscribed { stream_part_id, .. }
            | Self::OneWayConnectionClosed { stream_part_id, .. }
            | Self::JoinCompleted { stream_part_id, .. }
            | Self::JoinFailed { stream_part_id, .. } => Some(stream_part_id.clone()),
        }
    }
}

/// Event topics for subscription filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventTopic {
    Connections,
    Messages,
    Subscriptions,
    JoinOperations,
    /// All events (no filtering).
    All,
}

/// Filter for subscribing to specific events.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Topics to include. Empty means all topics.
    pub topics: Vec<EventTopic>,
    /// Stream parts to include. Empty means all; events without a stream
    /// part only pass an empty list.
    pub stream_parts: Vec<StreamPartId>,
}

impl EventFilter {
    /// Create a filter that accepts all events.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Create a filter for specific topics.
    #[must_use]
    pub fn topics(topics: Vec<EventTopic>) -> Self {
        Self {
            topics,
            stream_parts: Vec::new(),
        }
    }

    /// Narrow the filter to one stream part.
    #[must_use]
    pub fn for_stream_part(mut self, stream_part_id: StreamPartId) -> Self {
        self.stream_parts.push(stream_part_id);
        self
    }

    /// Check if an event matches this filter.
    #[must_use]
    pub fn matches(&self, event: &NodeEvent) -> bool {
        let topic_match = self.topics.is_empty()
            || self.topics.contains(&EventTopic::All)
            || self.topics.contains(&event.topic());

        let stream_part_match = self.stream_parts.is_empty()
            || event
                .stream_part_id()
                .is_some_and(|id| self.stream_parts.contains(&id));

        topic_match && stream_part_match
    }
}

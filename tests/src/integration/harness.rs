//! Shared fixtures for the integration flows.

use node_runtime::{Node, NodeConfig, NodeToNode, SimulatedNetwork, SimulatedNodeToTracker};
use shared_bus::{EventFilter, NodeEvent, Subscription};
use shared_types::{
    InstructionMessage, MessageId, MessageRef, NodeId, StreamMessage, StreamMessageContent,
    StreamPartId, TrackerId, TrackerRecord,
};
use sm_03_tracker_sync::NodeToTracker;
use std::sync::Arc;
use std::time::Duration;

pub fn trackers(n: usize) -> Vec<TrackerRecord> {
    (0..n)
        .map(|i| TrackerRecord::new(format!("t{i}"), format!("ws://t{i}"), format!("http://t{i}")))
        .collect()
}

pub fn config(num_of_trackers: usize) -> NodeConfig {
    let mut config = NodeConfig::default();
    config.tracker.trackers = trackers(num_of_trackers);
    config
}

pub fn stream_part() -> StreamPartId {
    StreamPartId::new("integration-stream", 0)
}

/// The `n`th message of one publisher's chain, referencing the one before.
pub fn chained_message(publisher: &NodeId, n: u64) -> StreamMessage {
    let stream_part_id = stream_part();
    StreamMessage {
        message_id: MessageId {
            stream_id: stream_part_id.stream_id,
            stream_partition: stream_part_id.partition,
            timestamp: n + 1,
            sequence_number: 0,
            publisher_id: publisher.to_string(),
            msg_chain_id: "chain".to_string(),
        },
        prev_msg_ref: (n > 0).then(|| MessageRef::new(n, 0)),
        content: StreamMessageContent::Data {
            payload: n.to_be_bytes().to_vec(),
        },
    }
}

/// Let spawned tasks run to completion.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}

pub struct MeshNode {
    pub node: Node,
    pub tracker: Arc<SimulatedNodeToTracker>,
    pub events: Subscription,
}

impl MeshNode {
    pub fn drain_events(&mut self) -> Vec<NodeEvent> {
        self.events.drain()
    }
}

/// Nodes `node-0..node-n` on one simulated network.
pub struct Mesh {
    pub network: SimulatedNetwork,
    pub nodes: Vec<MeshNode>,
}

impl Mesh {
    /// Start `n` nodes, none subscribed to anything yet.
    pub fn start(n: usize, config: &NodeConfig) -> Self {
        let network = SimulatedNetwork::new();
        let nodes = (0..n)
            .map(|i| {
                let node_id = Self::node_id(i);
                let transport: Arc<dyn NodeToNode> = network.add_node(node_id.clone());
                let tracker = Arc::new(SimulatedNodeToTracker::new());
                let node = Node::new(
                    node_id,
                    config.clone(),
                    transport,
                    Arc::clone(&tracker) as Arc<dyn NodeToTracker>,
                )
                .unwrap();
                let events = node.subscribe(EventFilter::all());
                node.start();
                MeshNode {
                    node,
                    tracker,
                    events,
                }
            })
            .collect();
        Self { network, nodes }
    }

    /// Start `n` nodes, all subscribed to [`stream_part`].
    pub async fn subscribed(n: usize, config: &NodeConfig) -> Self {
        let mesh = Self::start(n, config);
        for mesh_node in &mesh.nodes {
            mesh_node
                .node
                .subscribe_to_stream_part_if_have_not_yet(&stream_part());
        }
        settle().await;
        mesh
    }

    pub fn node_id(i: usize) -> NodeId {
        NodeId::new(format!("node-{i}"))
    }

    pub fn node(&self, i: usize) -> &Node {
        &self.nodes[i].node
    }

    /// Deliver an instruction to node `i` from its stream part's tracker.
    pub fn instruct(&self, i: usize, targets: &[usize], counter: u64) {
        let tracker_id = self.node(i).get_tracker_id(&stream_part());
        self.instruct_from(i, targets, counter, tracker_id);
    }

    pub fn instruct_from(&self, i: usize, targets: &[usize], counter: u64, tracker_id: TrackerId) {
        let node_ids = targets.iter().map(|t| Self::node_id(*t)).collect();
        self.nodes[i].tracker.inject_instruction(
            InstructionMessage::new(&stream_part(), node_ids, counter),
            tracker_id,
        );
    }

    /// Instruct every node to neighbor every other node.
    pub fn instruct_full_mesh(&self, counter: u64) {
        let all: Vec<usize> = (0..self.nodes.len()).collect();
        for i in 0..self.nodes.len() {
            let others: Vec<usize> = all.iter().copied().filter(|j| *j != i).collect();
            self.instruct(i, &others, counter);
        }
    }

    pub async fn stop(&self) {
        for mesh_node in &self.nodes {
            let _ = mesh_node.node.stop().await;
        }
    }
}

pub fn count_unseen(events: &[NodeEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, NodeEvent::UnseenMessageReceived { .. }))
        .count()
}

pub fn count_duplicates(events: &[NodeEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, NodeEvent::DuplicateMessageReceived { .. }))
        .count()
}

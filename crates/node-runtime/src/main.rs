//! # StreamMesh Node Runtime
//!
//! Runs a small simulated overlay end to end: a handful of nodes on one
//! [`SimulatedNetwork`], each with its own simulated tracker connection.
//!
//! ## Startup Sequence
//!
//! 1. Initialize logging (`RUST_LOG` overrides the default level)
//! 2. Load configuration from `SM_*` environment variables
//! 3. Start every node and subscribe it to the demo stream part
//! 4. Instruct each node to neighbor every other node
//! 5. Publish from the first node and report what each node received
//! 6. Stop every node

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use node_runtime::{
    init_tracing, Node, NodeConfig, NodeToNode, SimulatedNetwork, SimulatedNodeToTracker,
};
use shared_bus::{EventFilter, EventTopic, NodeEvent, Subscription};
use shared_types::{
    InstructionMessage, MessageId, MessageRef, NodeId, StreamMessage, StreamMessageContent,
    StreamPartId, TrackerRecord,
};
use sm_03_tracker_sync::NodeToTracker;
use tracing::{info, warn};

const NUM_OF_NODES: usize = 4;
const NUM_OF_MESSAGES: u64 = 10;
const DEMO_STREAM: &str = "demo-stream";

struct DemoNode {
    node: Node,
    tracker: Arc<SimulatedNodeToTracker>,
    messages: Subscription,
}

/// Load configuration, falling back to one simulated tracker.
fn load_config() -> Result<NodeConfig> {
    let mut config = NodeConfig::from_env().context("invalid SM_* configuration")?;
    if config.tracker.trackers.is_empty() {
        info!("SM_TRACKERS not set, using a simulated tracker");
        config.tracker.trackers = vec![TrackerRecord::new(
            "simulated-tracker",
            "ws://127.0.0.1:30301",
            "http://127.0.0.1:30301",
        )];
    }
    Ok(config)
}

fn demo_message(stream_part_id: &StreamPartId, n: u64, publisher: &NodeId) -> StreamMessage {
    StreamMessage {
        message_id: MessageId {
            stream_id: stream_part_id.stream_id.clone(),
            stream_partition: stream_part_id.partition,
            timestamp: n + 1,
            sequence_number: 0,
            publisher_id: publisher.to_string(),
            msg_chain_id: "demo-chain".to_string(),
        },
        prev_msg_ref: (n > 0).then(|| MessageRef::new(n, 0)),
        content: StreamMessageContent::Data {
            payload: format!("hello #{n}").into_bytes(),
        },
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("info")?;
    let config = load_config()?;

    info!("===========================================");
    info!("  StreamMesh Node Runtime v0.1.0");
    info!("  Simulated mesh of {} nodes", NUM_OF_NODES);
    info!("===========================================");

    let network = SimulatedNetwork::new();
    let stream_part_id = StreamPartId::new(DEMO_STREAM, 0);
    let node_ids: Vec<NodeId> = (0..NUM_OF_NODES)
        .map(|i| NodeId::new(format!("node-{i}")))
        .collect();

    let mut nodes = Vec::with_capacity(NUM_OF_NODES);
    for node_id in &node_ids {
        let transport: Arc<dyn NodeToNode> = network.add_node(node_id.clone());
        let tracker = Arc::new(SimulatedNodeToTracker::new());
        let node = Node::new(
            node_id.clone(),
            config.clone(),
            transport,
            Arc::clone(&tracker) as Arc<dyn NodeToTracker>,
        )?;
        node.start();
        node.subscribe_to_stream_part_if_have_not_yet(&stream_part_id);
        let messages = node.subscribe(
            EventFilter::topics(vec![EventTopic::Messages]).for_stream_part(stream_part_id.clone()),
        );
        nodes.push(DemoNode {
            node,
            tracker,
            messages,
        });
    }
    tokio::time::sleep(Duration::from_millis(50)).await;

    for demo in &nodes {
        let tracker_id = demo.node.get_tracker_id(&stream_part_id);
        let others: Vec<NodeId> = node_ids
            .iter()
            .filter(|id| *id != demo.node.node_id())
            .cloned()
            .collect();
        demo.tracker.inject_instruction(
            InstructionMessage::new(&stream_part_id, others, 1),
            tracker_id,
        );
    }
    tokio::time::sleep(Duration::from_millis(200)).await;

    for demo in &nodes {
        info!(
            node_id = %demo.node.node_id(),
            neighbors = ?demo.node.get_neighbors_for_stream_part(&stream_part_id)?,
            "Topology formed"
        );
    }

    let publisher = &nodes[0].node;
    for n in 0..NUM_OF_MESSAGES {
        publisher.publish(demo_message(&stream_part_id, n, publisher.node_id()))?;
    }
    tokio::time::sleep(Duration::from_millis(200)).await;

    for demo in &mut nodes {
        let (mut unseen, mut duplicates) = (0, 0);
        for event in demo.messages.drain() {
            match event {
                NodeEvent::UnseenMessageReceived { .. } => unseen += 1,
                NodeEvent::DuplicateMessageReceived { .. } => duplicates += 1,
                _ => {}
            }
        }
        if unseen != NUM_OF_MESSAGES {
            warn!(node_id = %demo.node.node_id(), unseen, "Node missed messages");
        }
        info!(
            node_id = %demo.node.node_id(),
            unseen,
            duplicates,
            statuses_sent = demo.tracker.statuses().len(),
            "Delivery report"
        );
    }

    info!("Initiating graceful shutdown...");
    for demo in &nodes {
        demo.node.stop().await?;
    }
    info!("Shutdown complete");
    Ok(())
}

//! # Node
//!
//! The overlay node: owns the per-topic neighbor state and wires the
//! propagation, tracker sync and disconnection subsystems to the transports.
//!
//! ## Data Path
//!
//! ```text
//! transport DATA_RECEIVED ─┐
//!                          ├─→ on_data_received ─→ duplicate detection
//! publish() ───────────────┘                           │
//!                                     unseen ──────────┴────── duplicate
//!                                        │                         │
//!                         UnseenMessageReceived           DuplicateMessageReceived
//!                                        │
//!                           propagation targets ─→ Propagation
//! ```
//!
//! ## Topic Lifecycle
//!
//! A topic is NOT_SUBSCRIBED until `subscribe_to_stream_part_if_have_not_yet`
//! (or a publish) sets it up and notifies the tracker. Tracker instructions
//! then converge its neighbor set. `unsubscribe_from_stream_part` tears the
//! entry down and reports counter `-1`. Topics set up behind a proxy only
//! have one-way links managed through the proxy methods.
//!
//! ## Thread Safety
//!
//! `Node` is cheap to clone. The stream part lock is never held while
//! calling into the tracker manager, the disconnection manager, the proxy
//! layer or a transport.

mod delivery;

pub use delivery::{DeliveryFailures, CONSECUTIVE_DELIVERY_FAILURE_LIMIT};

use futures::future::join_all;
use parking_lot::Mutex;
use shared_bus::{
    EventFilter, EventPublisher, EventSubscriber, EventTopic, InMemoryEventBus, NodeEvent,
    Subscription,
};
use shared_types::{
    ExtraMetadata, Location, NodeDescriptor, NodeId, StreamMessage, StreamPartId, TrackerId,
};
use sm_01_stream_parts::{DetectorError, StreamPartError, StreamPartManager};
use sm_02_propagation::Propagation;
use sm_03_tracker_sync::{
    NodeToTracker, SharedStreamParts, TrackerManager, TrackerRegistry, TrackerSyncError,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::container::NodeConfig;
use crate::disconnection::DisconnectionManager;
use crate::errors::NodeError;
use crate::ports::{NoProxyConnections, NodeToNode, NodeToNodeEvent, ProxyConnections, ProxyDirection};
use crate::wiring::{DisconnectionAdapter, NodeSubscriber, PropagationSender};

type NodePropagation = Propagation<PropagationSender>;
type NodeTrackerManager = TrackerManager<dyn NodeToTracker, NodeSubscriber>;
type NodeDisconnection = DisconnectionManager<DisconnectionAdapter>;

/// A random node id.
pub fn random_node_id() -> NodeId {
    NodeId::new(Uuid::new_v4().to_string())
}

#[derive(Clone)]
pub struct Node {
    inner: Arc<NodeInner>,
}

pub(crate) struct NodeInner {
    node_id: NodeId,
    node_connect_timeout: Duration,
    accept_proxy_connections: bool,
    location: Option<Location>,
    started: String,
    pub(crate) transport: Arc<dyn NodeToNode>,
    proxy: Arc<dyn ProxyConnections>,
    stream_parts: SharedStreamParts,
    propagation: NodePropagation,
    disconnection: NodeDisconnection,
    tracker_manager: NodeTrackerManager,
    bus: InMemoryEventBus,
    pub(crate) delivery_failures: DeliveryFailures,
    extra_metadata: Mutex<ExtraMetadata>,
    transport_pump: Mutex<Option<JoinHandle<()>>>,
    stopped: AtomicBool,
}

impl Node {
    pub fn new(
        node_id: NodeId,
        config: NodeConfig,
        transport: Arc<dyn NodeToNode>,
        tracker_transport: Arc<dyn NodeToTracker>,
    ) -> Result<Self, NodeError> {
        Self::with_proxy_connections(
            node_id,
            config,
            transport,
            tracker_transport,
            Arc::new(NoProxyConnections),
        )
    }

    pub fn with_proxy_connections(
        node_id: NodeId,
        config: NodeConfig,
        transport: Arc<dyn NodeToNode>,
        tracker_transport: Arc<dyn NodeToTracker>,
        proxy: Arc<dyn ProxyConnections>,
    ) -> Result<Self, NodeError> {
        config.validate()?;
        let registry = TrackerRegistry::new(config.tracker.trackers.clone())?;

        let stream_parts: SharedStreamParts = Arc::new(Mutex::new(
            StreamPartManager::with_max_number_of_gaps(config.max_number_of_gaps),
        ));
        let disconnection = DisconnectionManager::new(
            DisconnectionAdapter {
                transport: Arc::clone(&transport),
                stream_parts: Arc::clone(&stream_parts),
            },
            config.disconnection_wait_time,
            config.disconnection_cleanup_interval,
        );

        let inner = Arc::new_cyclic(|weak: &Weak<NodeInner>| NodeInner {
            propagation: Propagation::new(
                PropagationSender { node: weak.clone() },
                config.propagation.clone(),
            ),
            tracker_manager: TrackerManager::with_registry(
                registry,
                &config.tracker,
                Arc::clone(&stream_parts),
                tracker_transport,
                NodeSubscriber { node: weak.clone() },
            ),
            node_id,
            node_connect_timeout: config.node_connect_timeout,
            accept_proxy_connections: config.accept_proxy_connections,
            location: config.location.clone(),
            started: chrono::Utc::now().to_rfc3339(),
            transport,
            proxy,
            stream_parts,
            disconnection,
            bus: InMemoryEventBus::new(),
            delivery_failures: DeliveryFailures::default(),
            extra_metadata: Mutex::new(ExtraMetadata::new()),
            transport_pump: Mutex::new(None),
            stopped: AtomicBool::new(false),
        });
        Ok(Self { inner })
    }

    pub fn node_id(&self) -> &NodeId {
        &self.inner.node_id
    }

    /// Start tracker sync, the disconnection sweep and transport event
    /// handling. Must be called from within a tokio runtime.
    pub fn start(&self) {
        trace!(node_id = %self.inner.node_id, "Starting node");
        self.inner.tracker_manager.start();
        self.inner.disconnection.start();

        let events = self.inner.transport.subscribe();
        let handle = tokio::spawn(pump_transport_events(Arc::downgrade(&self.inner), events));
        if let Some(previous) = self.inner.transport_pump.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Tear down the proxy layer, the disconnection manager, the transport
    /// and the tracker manager, in that order.
    pub async fn stop(&self) -> Result<(), NodeError> {
        if self.inner.stopped.swap(true, Ordering::SeqCst) {
            return Err(NodeError::AlreadyStopped);
        }
        debug!(node_id = %self.inner.node_id, "Stopping node");
        self.inner.proxy.stop();
        self.inner.disconnection.stop();
        if let Some(handle) = self.inner.transport_pump.lock().take() {
            handle.abort();
        }
        self.inner.transport.stop().await;
        self.inner.tracker_manager.stop().await;
        Ok(())
    }

    /// Events published by this node from now on.
    pub fn subscribe(&self, filter: EventFilter) -> Subscription {
        self.inner.bus.subscribe(filter)
    }

    // =========================================================================
    // TOPIC LIFECYCLE
    // =========================================================================

    pub fn subscribe_to_stream_part_if_have_not_yet(&self, stream_part_id: &StreamPartId) {
        self.inner
            .subscribe_to_stream_part_if_have_not_yet(stream_part_id, true);
    }

    pub fn unsubscribe_from_stream_part(&self, stream_part_id: &StreamPartId) -> Result<(), NodeError> {
        trace!(stream_part_id = %stream_part_id, "Removing stream part");
        self.inner.stream_parts.lock().remove_stream_part(stream_part_id)?;
        self.inner
            .tracker_manager
            .on_unsubscribe_from_stream_part(stream_part_id);
        self.inner
            .tracker_manager
            .send_stream_part_status(stream_part_id);
        Ok(())
    }

    /// Subscribe and wait until the first instruction for the topic has been
    /// applied. Resolves with the neighbor count.
    ///
    /// Resolves at once when already subscribed. `timeout` defaults to the
    /// node connect timeout.
    pub async fn subscribe_and_wait_for_join_operation(
        &self,
        stream_part_id: &StreamPartId,
        timeout: Option<Duration>,
    ) -> Result<usize, NodeError> {
        {
            let stream_parts = self.inner.stream_parts.lock();
            if stream_parts.is_set_up(stream_part_id) {
                return Ok(stream_parts
                    .get_all_nodes_for_stream_part(stream_part_id)?
                    .len());
            }
        }

        let mut subscription = self.inner.bus.subscribe(
            EventFilter::topics(vec![EventTopic::JoinOperations])
                .for_stream_part(stream_part_id.clone()),
        );
        self.inner
            .subscribe_to_stream_part_if_have_not_yet(stream_part_id, true);

        let outcome = async {
            loop {
                match subscription.recv().await {
                    Some(NodeEvent::JoinCompleted {
                        num_of_neighbors, ..
                    }) => return Ok(num_of_neighbors),
                    Some(NodeEvent::JoinFailed { reason, .. }) => {
                        return Err(NodeError::JoinFailed {
                            stream_part_id: stream_part_id.clone(),
                            reason,
                        })
                    }
                    Some(_) => continue,
                    None => return Err(NodeError::EventBusClosed),
                }
            }
        };
        tokio::time::timeout(timeout.unwrap_or(self.inner.node_connect_timeout), outcome)
            .await
            .map_err(|_| NodeError::JoinTimeout(stream_part_id.clone()))?
    }

    // =========================================================================
    // DATA
    // =========================================================================

    /// Publish a message originating at this node, subscribing to its topic
    /// first if needed.
    pub fn publish(&self, message: StreamMessage) -> Result<(), NodeError> {
        let stream_part_id = message.stream_part_id();
        if message.is_content() && self.is_proxied_stream_part(&stream_part_id, ProxyDirection::Subscribe) {
            return Err(NodeError::PublishToProxiedSubscribe(stream_part_id));
        }
        self.inner
            .subscribe_to_stream_part_if_have_not_yet(&stream_part_id, true);
        self.inner.on_data_received(message, None)
    }

    /// Handle a message from `source`, or from this node when `None`.
    pub fn on_data_received(&self, message: StreamMessage, source: Option<NodeId>) -> Result<(), NodeError> {
        self.inner.on_data_received(message, source)
    }

    // =========================================================================
    // PROXY LINKS
    // =========================================================================

    /// Set up a topic whose links are one-way proxy connections only.
    pub fn set_up_proxied_stream_part(&self, stream_part_id: &StreamPartId) -> Result<(), NodeError> {
        self.inner
            .stream_parts
            .lock()
            .set_up_stream_part(stream_part_id, true)?;
        Ok(())
    }

    pub fn add_in_only_neighbor(&self, stream_part_id: &StreamPartId, node_id: NodeId) -> Result<(), NodeError> {
        self.inner
            .stream_parts
            .lock()
            .add_in_only_neighbor(stream_part_id, node_id)?;
        Ok(())
    }

    /// Add a one-way outbound link and offer it any message still
    /// propagating on the topic.
    pub fn add_out_only_neighbor(&self, stream_part_id: &StreamPartId, node_id: NodeId) -> Result<(), NodeError> {
        self.inner
            .stream_parts
            .lock()
            .add_out_only_neighbor(stream_part_id, node_id.clone())?;
        self.inner.disconnection.cancel_scheduled_disconnection(&node_id);
        self.inner
            .propagation
            .on_neighbor_joined(&node_id, stream_part_id);
        Ok(())
    }

    /// Drop a one-way link. A proxied topic left without links is removed.
    pub fn remove_one_way_connection(&self, stream_part_id: &StreamPartId, node_id: &NodeId) -> Result<(), NodeError> {
        {
            let mut stream_parts = self.inner.stream_parts.lock();
            stream_parts.remove_node_from_stream_part(stream_part_id, node_id)?;
            if stream_parts.is_behind_proxy(stream_part_id)
                && stream_parts
                    .get_all_nodes_for_stream_part(stream_part_id)?
                    .is_empty()
            {
                stream_parts.remove_stream_part(stream_part_id)?;
            }
        }
        self.inner.bus.publish(NodeEvent::OneWayConnectionClosed {
            node_id: node_id.clone(),
            stream_part_id: stream_part_id.clone(),
        });
        self.inner
            .disconnection
            .schedule_disconnection_if_no_shared_stream_parts(node_id);
        Ok(())
    }

    pub fn is_proxied_stream_part(&self, stream_part_id: &StreamPartId, direction: ProxyDirection) -> bool {
        self.inner.stream_parts.lock().is_behind_proxy(stream_part_id)
            && self.inner.proxy.is_proxied_stream_part(stream_part_id, direction)
    }

    // =========================================================================
    // QUERIES
    // =========================================================================

    pub fn get_stream_parts(&self) -> Vec<StreamPartId> {
        self.inner.stream_parts.lock().get_stream_parts()
    }

    /// Distinct two-way neighbors across all topics.
    pub fn get_neighbors(&self) -> Vec<NodeId> {
        self.inner.stream_parts.lock().get_all_nodes()
    }

    pub fn get_neighbors_for_stream_part(&self, stream_part_id: &StreamPartId) -> Result<Vec<NodeId>, NodeError> {
        Ok(self
            .inner
            .stream_parts
            .lock()
            .get_neighbors_for_stream_part(stream_part_id)?)
    }

    pub fn get_tracker_id(&self, stream_part_id: &StreamPartId) -> TrackerId {
        self.inner.tracker_manager.get_tracker_id(stream_part_id)
    }

    /// Free-form metadata reported to trackers with every status.
    pub fn set_extra_metadata(&self, extra: ExtraMetadata) {
        *self.inner.extra_metadata.lock() = extra;
    }

    pub fn num_of_active_propagation_tasks(&self) -> usize {
        self.inner.propagation.num_of_active_propagation_tasks()
    }
}

impl NodeInner {
    fn emit(&self, event: NodeEvent) {
        self.bus.publish(event);
    }

    pub(crate) fn subscribe_to_stream_part_if_have_not_yet(&self, stream_part_id: &StreamPartId, send_status: bool) {
        let newly_set_up = {
            let mut stream_parts = self.stream_parts.lock();
            if stream_parts.is_set_up(stream_part_id) {
                if stream_parts.is_behind_proxy(stream_part_id) {
                    trace!(
                        stream_part_id = %stream_part_id,
                        "Not joining stream part, it is set up behind a proxy"
                    );
                }
                false
            } else {
                stream_parts.set_up_stream_part(stream_part_id, false).is_ok()
            }
        };
        if newly_set_up {
            trace!(stream_part_id = %stream_part_id, "Set up stream part");
            self.tracker_manager.on_new_stream_part(stream_part_id);
            if send_status {
                self.tracker_manager.send_stream_part_status(stream_part_id);
            }
        }
    }

    pub(crate) async fn subscribe_to_stream_part_on_nodes(
        &self,
        node_ids: &[NodeId],
        stream_part_id: &StreamPartId,
        tracker_id: &TrackerId,
        reattempt: bool,
    ) -> Vec<Result<NodeId, TrackerSyncError>> {
        let attempts = node_ids.iter().map(|node_id| async move {
            let connect = self
                .transport
                .connect_to_node(node_id, tracker_id, !reattempt);
            match tokio::time::timeout(self.node_connect_timeout, connect).await {
                Err(_) => Err(TrackerSyncError::ConnectTimeout(node_id.clone())),
                Ok(Err(e)) => Err(TrackerSyncError::ConnectFailed {
                    node_id: node_id.clone(),
                    reason: e.to_string(),
                }),
                Ok(Ok(_)) => {
                    self.disconnection.cancel_scheduled_disconnection(node_id);
                    self.subscribe_to_stream_part_on_node(node_id, stream_part_id, false)
                        .map(|()| node_id.clone())
                        .map_err(TrackerSyncError::from)
                }
            }
        });
        join_all(attempts).await
    }

    fn subscribe_to_stream_part_on_node(
        &self,
        node_id: &NodeId,
        stream_part_id: &StreamPartId,
        send_status: bool,
    ) -> Result<(), StreamPartError> {
        self.stream_parts
            .lock()
            .add_neighbor(stream_part_id, node_id.clone())?;
        self.propagation.on_neighbor_joined(node_id, stream_part_id);
        if send_status {
            self.tracker_manager.send_stream_part_status(stream_part_id);
        }
        self.emit(NodeEvent::NodeSubscribed {
            node_id: node_id.clone(),
            stream_part_id: stream_part_id.clone(),
        });
        Ok(())
    }

    pub(crate) fn unsubscribe_from_stream_part_on_node(
        &self,
        node_id: &NodeId,
        stream_part_id: &StreamPartId,
        send_status: bool,
    ) {
        if let Err(e) = self
            .stream_parts
            .lock()
            .remove_node_from_stream_part(stream_part_id, node_id)
        {
            trace!(node_id = %node_id, error = %e, "Unsubscribe on node skipped");
            return;
        }
        trace!(node_id = %node_id, stream_part_id = %stream_part_id, "Node unsubscribed from stream part");
        self.emit(NodeEvent::NodeUnsubscribed {
            node_id: node_id.clone(),
            stream_part_id: stream_part_id.clone(),
        });
        self.disconnection
            .schedule_disconnection_if_no_shared_stream_parts(node_id);
        if send_status {
            self.tracker_manager.send_stream_part_status(stream_part_id);
        }
    }

    pub(crate) fn on_node_disconnected(&self, node_id: &NodeId) {
        let removed = self
            .stream_parts
            .lock()
            .remove_node_from_all_stream_parts(node_id);
        trace!(node_id = %node_id, "Removed all subscriptions of node");
        for stream_part_id in &removed.changed {
            self.tracker_manager.send_stream_part_status(stream_part_id);
        }
        for stream_part_id in &removed.behind_proxy {
            self.proxy.remove_connection(stream_part_id, node_id);
        }
        self.disconnection.cancel_scheduled_disconnection(node_id);
        self.delivery_failures.record_success(node_id);
        self.emit(NodeEvent::NodeDisconnected(node_id.clone()));
    }

    pub(crate) fn on_data_received(&self, message: StreamMessage, source: Option<NodeId>) -> Result<(), NodeError> {
        let stream_part_id = message.stream_part_id();
        {
            let stream_parts = self.stream_parts.lock();
            if !stream_parts.is_set_up(&stream_part_id) {
                trace!(
                    stream_part_id = %stream_part_id,
                    message_id = %message.message_id,
                    "Dropping message for stream part that is not set up"
                );
                return Ok(());
            }
            if let Some(source) = &source {
                if stream_parts.is_behind_proxy(&stream_part_id)
                    && message.is_content()
                    && !stream_parts.has_inbound_connection(&stream_part_id, source)?
                {
                    warn!(
                        source = %source,
                        stream_part_id = %stream_part_id,
                        "Unexpected message received on outbound proxy stream part"
                    );
                    return Ok(());
                }
            }
        }

        self.emit(NodeEvent::MessageReceived {
            message: message.clone(),
            source: source.clone(),
        });

        let checked = self
            .stream_parts
            .lock()
            .mark_numbers_and_check_that_is_not_duplicate(&message.message_id, message.prev_msg_ref);
        let is_unseen = match checked {
            Ok(is_unseen) => is_unseen,
            Err(StreamPartError::Detector(e @ DetectorError::InvalidNumbering { .. })) => {
                trace!(
                    source = ?source,
                    message_id = %message.message_id,
                    error = %e,
                    "Received data with invalid numbering"
                );
                return Ok(());
            }
            Err(StreamPartError::Detector(e @ DetectorError::GapMisMatch { .. })) => {
                warn!(
                    source = ?source,
                    message_id = %message.message_id,
                    error = %e,
                    "Received data with gap mismatch detected"
                );
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        if is_unseen {
            trace!(source = ?source, message_id = %message.message_id, "Received unseen data");
            let targets = self.propagation_targets(&message);
            self.emit(NodeEvent::UnseenMessageReceived {
                message: message.clone(),
                source: source.clone(),
            });
            self.propagation.feed_unseen_message(message, targets, source);
        } else {
            trace!(source = ?source, message_id = %message.message_id, "Ignoring duplicate data");
            self.emit(NodeEvent::DuplicateMessageReceived { message, source });
        }
        Ok(())
    }

    /// Outbound neighbors, plus proxy clients for key exchange addressed to
    /// them, or inbound links on a topic proxied for subscribing.
    fn propagation_targets(&self, message: &StreamMessage) -> Vec<NodeId> {
        let stream_part_id = message.stream_part_id();
        let (mut targets, behind_proxy, inbound) = {
            let stream_parts = self.stream_parts.lock();
            (
                stream_parts
                    .get_outbound_nodes_for_stream_part(&stream_part_id)
                    .unwrap_or_default(),
                stream_parts.is_behind_proxy(&stream_part_id),
                stream_parts
                    .get_inbound_nodes_for_stream_part(&stream_part_id)
                    .unwrap_or_default(),
            )
        };

        if self.accept_proxy_connections {
            if let Some(recipient) = message.group_key_recipient() {
                targets.extend(self.proxy.node_ids_for_user(&stream_part_id, recipient));
            }
        } else if behind_proxy
            && self
                .proxy
                .is_proxied_stream_part(&stream_part_id, ProxyDirection::Subscribe)
        {
            targets.extend(inbound);
        }

        let mut seen = std::collections::HashSet::new();
        targets.retain(|node_id| seen.insert(node_id.clone()));
        targets
    }

    pub(crate) fn emit_join_completed(&self, stream_part_id: &StreamPartId, num_of_neighbors: usize) {
        self.emit(NodeEvent::JoinCompleted {
            stream_part_id: stream_part_id.clone(),
            num_of_neighbors,
        });
    }

    pub(crate) fn emit_join_failed(&self, stream_part_id: &StreamPartId, reason: String) {
        self.emit(NodeEvent::JoinFailed {
            stream_part_id: stream_part_id.clone(),
            reason,
        });
    }

    pub(crate) fn descriptor(&self, include_rtt: bool) -> NodeDescriptor {
        NodeDescriptor {
            started: self.started.clone(),
            location: self.location.clone(),
            extra: self.extra_metadata.lock().clone(),
            rtts: include_rtt.then(|| self.transport.get_rtts()),
        }
    }

    fn handle_transport_event(&self, event: NodeToNodeEvent) {
        match event {
            NodeToNodeEvent::NodeConnected(node_id) => {
                self.emit(NodeEvent::NodeConnected(node_id));
            }
            NodeToNodeEvent::NodeDisconnected(node_id) => {
                self.on_node_disconnected(&node_id);
            }
            NodeToNodeEvent::DataReceived { message, source } => {
                let message_id = message.message_id.clone();
                if let Err(e) = self.on_data_received(message, Some(source.clone())) {
                    warn!(source = %source, message_id = %message_id, error = %e, "Handling received data failed");
                }
            }
        }
    }
}

async fn pump_transport_events(node: Weak<NodeInner>, mut events: broadcast::Receiver<NodeToNodeEvent>) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Transport event receiver lagged");
                continue;
            }
            Err(RecvError::Closed) => return,
        };
        let Some(node) = node.upgrade() else {
            return;
        };
        node.handle_transport_event(event);
    }
}

//! # Tracker Manager
//!
//! Applies tracker instructions to the node's topology and reports the
//! resulting stream part status back to the owning tracker.

use async_trait::async_trait;
use parking_lot::Mutex;
use shared_types::{
    InstructionMessage, NodeId, StatusMessage, StreamPartId, StreamPartStatus, TrackerId,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::connector::TrackerConnector;
use crate::domain::{SharedStreamParts, TrackerManagerConfig, TrackerRegistry};
use crate::events::{NodeToTrackerEvent, TrackerSyncError};
use crate::ports::outbound::{InstructionHandler, NodeToTracker, TopologySubscriber};
use crate::retry::InstructionRetryManager;
use crate::throttler::InstructionThrottler;

/// Tracker-facing half of a node.
///
/// Instructions arriving from the transport go through an
/// [`InstructionThrottler`]; every applied instruction also arms an
/// [`InstructionRetryManager`] timer for its stream part.
pub struct TrackerManager<T: NodeToTracker + ?Sized, S: TopologySubscriber> {
    inner: Arc<ManagerInner<T, S>>,
    throttler: InstructionThrottler<ThrottledHandler<T, S>>,
    retry: InstructionRetryManager<RetryHandler<T, S>>,
    connector: TrackerConnector<T>,
    event_pump: Mutex<Option<JoinHandle<()>>>,
}

struct ManagerInner<T: NodeToTracker + ?Sized, S: TopologySubscriber> {
    stream_parts: SharedStreamParts,
    transport: Arc<T>,
    subscriber: S,
    registry: Arc<TrackerRegistry>,
    rtt_update_interval: Duration,
    /// Last time RTTs were reported to each tracker.
    rtts_reported_at: Mutex<HashMap<TrackerId, Instant>>,
}

impl<T: NodeToTracker + ?Sized, S: TopologySubscriber> TrackerManager<T, S> {
    pub fn new(
        config: &TrackerManagerConfig,
        stream_parts: SharedStreamParts,
        transport: Arc<T>,
        subscriber: S,
    ) -> Result<Self, TrackerSyncError> {
        let registry = TrackerRegistry::new(config.trackers.clone())?;
        Ok(Self::with_registry(
            registry,
            config,
            stream_parts,
            transport,
            subscriber,
        ))
    }

    /// Build from an already validated registry.
    pub fn with_registry(
        registry: TrackerRegistry,
        config: &TrackerManagerConfig,
        stream_parts: SharedStreamParts,
        transport: Arc<T>,
        subscriber: S,
    ) -> Self {
        let registry = Arc::new(registry);
        let inner = Arc::new(ManagerInner {
            stream_parts: Arc::clone(&stream_parts),
            transport: Arc::clone(&transport),
            subscriber,
            registry: Arc::clone(&registry),
            rtt_update_interval: config.rtt_update_interval,
            rtts_reported_at: Mutex::new(HashMap::new()),
        });
        let retry = InstructionRetryManager::new(
            RetryHandler {
                inner: Arc::clone(&inner),
            },
            config.instruction_retry_interval,
            config.status_send_counter_limit,
        );
        let throttler = InstructionThrottler::new(ThrottledHandler {
            inner: Arc::clone(&inner),
            retry: retry.clone(),
        });
        let connector = TrackerConnector::new(
            stream_parts,
            transport,
            registry,
            config.tracker_connection_maintenance_interval,
        );
        Self {
            inner,
            throttler,
            retry,
            connector,
            event_pump: Mutex::new(None),
        }
    }

    /// Start tracker connection maintenance and transport event handling.
    pub fn start(&self) {
        self.connector.start();

        let events = self.inner.transport.subscribe();
        let inner = Arc::clone(&self.inner);
        let throttler = self.throttler.clone();
        let handle = tokio::spawn(async move {
            inner.pump_events(events, throttler).await;
        });
        if let Some(previous) = self.event_pump.lock().replace(handle) {
            previous.abort();
        }
    }

    pub async fn stop(&self) {
        self.throttler.stop();
        self.retry.stop();
        self.connector.stop();
        if let Some(handle) = self.event_pump.lock().take() {
            handle.abort();
        }
        self.inner.rtts_reported_at.lock().clear();
        self.inner.transport.stop().await;
    }

    /// Report the stream part's status to its tracker in the background.
    pub fn send_stream_part_status(&self, stream_part_id: &StreamPartId) {
        let inner = Arc::clone(&self.inner);
        let stream_part_id = stream_part_id.clone();
        tokio::spawn(async move {
            let tracker_id = inner.tracker_id(&stream_part_id);
            inner.send_status(&stream_part_id, &tracker_id).await;
        });
    }

    pub fn on_new_stream_part(&self, stream_part_id: &StreamPartId) {
        self.connector.on_new_stream_part(stream_part_id);
    }

    pub fn on_unsubscribe_from_stream_part(&self, stream_part_id: &StreamPartId) {
        self.throttler.remove_stream_part(stream_part_id);
        self.retry.remove_stream_part(stream_part_id);
    }

    /// Apply one instruction directly, bypassing throttling and retries.
    pub async fn handle_tracker_instruction(
        &self,
        instruction: InstructionMessage,
        tracker_id: TrackerId,
        reattempt: bool,
    ) -> Result<(), TrackerSyncError> {
        self.inner
            .handle_instruction(instruction, tracker_id, reattempt)
            .await
    }

    pub fn get_tracker_id(&self, stream_part_id: &StreamPartId) -> TrackerId {
        self.inner.tracker_id(stream_part_id)
    }

    pub fn get_tracker_address(&self, stream_part_id: &StreamPartId) -> String {
        self.inner.registry.get_tracker(stream_part_id).ws.clone()
    }
}

impl<T: NodeToTracker + ?Sized, S: TopologySubscriber> ManagerInner<T, S> {
    fn tracker_id(&self, stream_part_id: &StreamPartId) -> TrackerId {
        self.registry.get_tracker(stream_part_id).id.clone()
    }

    fn stream_parts_for_tracker(&self, tracker_id: &TrackerId) -> Vec<StreamPartId> {
        let stream_parts = self.stream_parts.lock().get_stream_parts();
        stream_parts
            .into_iter()
            .filter(|id| self.registry.get_tracker(id).id == *tracker_id)
            .collect()
    }

    /// True at most once per `rtt_update_interval` for each tracker.
    fn should_include_rtts(&self, tracker_id: &TrackerId) -> bool {
        let mut reported = self.rtts_reported_at.lock();
        let now = Instant::now();
        match reported.get(tracker_id) {
            Some(at) if now.duration_since(*at) < self.rtt_update_interval => false,
            _ => {
                reported.insert(tracker_id.clone(), now);
                true
            }
        }
    }

    fn build_status(&self, stream_part_id: &StreamPartId, tracker_id: &TrackerId) -> Option<StatusMessage> {
        let stream_part = {
            let stream_parts = self.stream_parts.lock();
            if stream_parts.is_behind_proxy(stream_part_id) {
                return None;
            }
            stream_parts
                .get_stream_part_status(stream_part_id)
                .unwrap_or_else(|_| StreamPartStatus::unsubscribed(stream_part_id))
        };
        let descriptor = self
            .subscriber
            .node_descriptor(self.should_include_rtts(tracker_id));
        Some(StatusMessage {
            stream_part,
            descriptor,
        })
    }

    async fn send_status(&self, stream_part_id: &StreamPartId, tracker_id: &TrackerId) {
        let Some(status) = self.build_status(stream_part_id, tracker_id) else {
            return;
        };
        match self.transport.send_status(tracker_id, status).await {
            Ok(()) => trace!(stream_part_id = %stream_part_id, tracker_id = %tracker_id, "Sent status to tracker"),
            Err(e) => trace!(tracker_id = %tracker_id, error = %e, "Failed to send status to tracker"),
        }
    }

    async fn handle_instruction(
        &self,
        instruction: InstructionMessage,
        tracker_id: TrackerId,
        reattempt: bool,
    ) -> Result<(), TrackerSyncError> {
        let stream_part_id = instruction.stream_part_id();
        let current_neighbors = {
            let stream_parts = self.stream_parts.lock();
            if !stream_parts.is_set_up(&stream_part_id) {
                return Ok(());
            }
            // Proxied topics are driven by their one-way links only.
            if stream_parts.is_behind_proxy(&stream_part_id) {
                trace!(stream_part_id = %stream_part_id, "Ignoring instruction for proxied stream part");
                return Ok(());
            }
            stream_parts.get_neighbors_for_stream_part(&stream_part_id)?
        };

        let expected_tracker_id = self.tracker_id(&stream_part_id);
        if tracker_id != expected_tracker_id {
            warn!(
                expected_tracker_id = %expected_tracker_id,
                tracker_id = %tracker_id,
                "Received instructions from unexpected tracker"
            );
            return Ok(());
        }
        trace!(
            stream_part_id = %stream_part_id,
            node_ids = ?instruction.node_ids,
            counter = instruction.counter,
            "Received instructions"
        );

        for node_id in current_neighbors
            .iter()
            .filter(|node_id| !instruction.node_ids.contains(node_id))
        {
            self.subscriber
                .unsubscribe_from_stream_part_on_node(node_id, &stream_part_id);
        }

        let results = self
            .subscriber
            .subscribe_to_stream_part_on_nodes(
                &instruction.node_ids,
                &stream_part_id,
                &tracker_id,
                reattempt,
            )
            .await;

        let new_stream_part = {
            let mut stream_parts = self.stream_parts.lock();
            if stream_parts.is_set_up(&stream_part_id) {
                let is_new = stream_parts.is_new_stream(&stream_part_id)?;
                stream_parts.update_counter(&stream_part_id, instruction.counter)?;
                is_new
            } else {
                false
            }
        };

        let mut subscribed: Vec<NodeId> = Vec::with_capacity(results.len());
        for result in results {
            match result {
                Ok(node_id) => subscribed.push(node_id),
                Err(e) => debug!(stream_part_id = %stream_part_id, error = %e, "Failed to subscribe to node"),
            }
        }
        let failed = subscribed.len() != instruction.node_ids.len();

        if !reattempt || failed {
            self.send_status(&stream_part_id, &tracker_id).await;
        }

        if new_stream_part {
            if subscribed.is_empty() {
                self.subscriber.emit_join_failed(
                    &stream_part_id,
                    format!(
                        "Failed initial join operation to stream partition {stream_part_id}, \
                         failed to form connections to all target neighbors"
                    ),
                );
            } else {
                self.subscriber
                    .emit_join_completed(&stream_part_id, subscribed.len());
            }
        }

        trace!(
            stream_part_id = %stream_part_id,
            subscribed = ?subscribed,
            counter = instruction.counter,
            fulfilled_all = !failed,
            "Fulfilled tracker instructions"
        );
        Ok(())
    }

    async fn pump_events(
        &self,
        mut events: broadcast::Receiver<NodeToTrackerEvent>,
        throttler: InstructionThrottler<ThrottledHandler<T, S>>,
    ) {
        loop {
            match events.recv().await {
                Ok(event) => self.on_tracker_event(event, &throttler).await,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Tracker event receiver lagged");
                }
                Err(RecvError::Closed) => return,
            }
        }
    }

    async fn on_tracker_event(
        &self,
        event: NodeToTrackerEvent,
        throttler: &InstructionThrottler<ThrottledHandler<T, S>>,
    ) {
        match event {
            NodeToTrackerEvent::InstructionReceived {
                instruction,
                tracker_id,
            } => throttler.add(instruction, tracker_id),
            NodeToTrackerEvent::StatusAckReceived { ack, .. } => {
                let stream_part_id = ack.stream_part_id();
                let is_new = {
                    let stream_parts = self.stream_parts.lock();
                    stream_parts.is_set_up(&stream_part_id)
                        && stream_parts.is_new_stream(&stream_part_id).unwrap_or(false)
                };
                if is_new {
                    self.subscriber.emit_join_completed(&stream_part_id, 0);
                }
            }
            NodeToTrackerEvent::ConnectedToTracker(tracker_id) => {
                trace!(tracker_id = %tracker_id, "Connected to tracker");
                for stream_part_id in self.stream_parts_for_tracker(&tracker_id) {
                    self.send_status(&stream_part_id, &tracker_id).await;
                }
            }
            NodeToTrackerEvent::TrackerDisconnected(tracker_id) => {
                trace!(tracker_id = %tracker_id, "Disconnected from tracker");
            }
        }
    }
}

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

/// Handler behind the throttler: arms the retry timer, then applies.
struct ThrottledHandler<T: NodeToTracker + ?Sized, S: TopologySubscriber> {
    inner: Arc<ManagerInner<T, S>>,
    retry: InstructionRetryManager<RetryHandler<T, S>>,
}

#[async_trait]
impl<T: NodeToTracker + ?Sized, S: TopologySubscriber> InstructionHandler for ThrottledHandler<T, S> {
    async fn handle_instruction(
        &self,
        instruction: InstructionMessage,
        tracker_id: TrackerId,
        reattempt: bool,
    ) -> Result<(), TrackerSyncError> {
        let trackable = {
            let stream_parts = self.inner.stream_parts.lock();
            let stream_part_id = instruction.stream_part_id();
            stream_parts.is_set_up(&stream_part_id) && !stream_parts.is_behind_proxy(&stream_part_id)
        };
        if trackable {
            self.retry.add(instruction.clone(), tracker_id.clone());
        }
        self.inner
            .handle_instruction(instruction, tracker_id, reattempt)
            .await
    }
}

/// Handler behind the retry timers.
struct RetryHandler<T: NodeToTracker + ?Sized, S: TopologySubscriber> {
    inner: Arc<ManagerInner<T, S>>,
}

#[async_trait]
impl<T: NodeToTracker + ?Sized, S: TopologySubscriber> InstructionHandler for RetryHandler<T, S> {
    async fn handle_instruction(
        &self,
        instruction: InstructionMessage,
        tracker_id: TrackerId,
        reattempt: bool,
    ) -> Result<(), TrackerSyncError> {
        self.inner
            .handle_instruction(instruction, tracker_id, reattempt)
            .await
    }
}

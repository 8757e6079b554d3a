//! Keeps tracker connections in line with the set-up stream parts.
//!
//! A tracker is connected while it owns at least one set-up stream part and
//! disconnected otherwise.

use parking_lot::Mutex;
use shared_types::{StreamPartId, TrackerId};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::domain::{SharedStreamParts, TrackerRegistry};
use crate::ports::outbound::NodeToTracker;

pub struct TrackerConnector<T: NodeToTracker + ?Sized> {
    inner: Arc<ConnectorInner<T>>,
}

struct ConnectorInner<T: NodeToTracker + ?Sized> {
    stream_parts: SharedStreamParts,
    transport: Arc<T>,
    registry: Arc<TrackerRegistry>,
    maintenance_interval: Duration,
    maintenance: Mutex<Option<JoinHandle<()>>>,
}

impl<T: NodeToTracker + ?Sized> Clone for TrackerConnector<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: NodeToTracker + ?Sized> TrackerConnector<T> {
    pub fn new(
        stream_parts: SharedStreamParts,
        transport: Arc<T>,
        registry: Arc<TrackerRegistry>,
        maintenance_interval: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(ConnectorInner {
                stream_parts,
                transport,
                registry,
                maintenance_interval,
                maintenance: Mutex::new(None),
            }),
        }
    }

    /// Run a maintenance pass now and then every maintenance interval.
    pub fn start(&self) {
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(inner.maintenance_interval);
            loop {
                ticker.tick().await;
                inner.maintain_connections().await;
            }
        });
        if let Some(previous) = self.inner.maintenance.lock().replace(handle) {
            previous.abort();
        }
    }

    pub async fn maintain_connections(&self) {
        self.inner.maintain_connections().await;
    }

    /// Connect to the tracker owning a freshly set-up stream part.
    pub fn on_new_stream_part(&self, stream_part_id: &StreamPartId) {
        let tracker = self.inner.registry.get_tracker(stream_part_id).clone();
        let transport = Arc::clone(&self.inner.transport);
        tokio::spawn(async move {
            if let Err(e) = transport.connect_to_tracker(&tracker).await {
                debug!(tracker_id = %tracker.id, error = %e, "Connecting to tracker failed");
            }
        });
    }

    pub fn stop(&self) {
        if let Some(handle) = self.inner.maintenance.lock().take() {
            handle.abort();
        }
    }
}

impl<T: NodeToTracker + ?Sized> ConnectorInner<T> {
    fn active_trackers(&self) -> HashSet<TrackerId> {
        let stream_parts = self.stream_parts.lock();
        stream_parts
            .get_stream_parts()
            .iter()
            .filter(|id| !stream_parts.is_behind_proxy(id))
            .map(|id| self.registry.get_tracker(id).id.clone())
            .collect()
    }

    async fn maintain_connections(&self) {
        let active = self.active_trackers();
        for tracker in self.registry.get_all_trackers() {
            if active.contains(&tracker.id) {
                if let Err(e) = self.transport.connect_to_tracker(tracker).await {
                    debug!(tracker_id = %tracker.id, error = %e, "Connecting to tracker failed");
                }
            } else {
                trace!(tracker_id = %tracker.id, "Tracker owns no stream parts, disconnecting");
                self.transport.disconnect_from_tracker(&tracker.id).await;
            }
        }
    }
}

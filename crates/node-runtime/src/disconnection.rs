//! # Disconnection Manager
//!
//! Drops peer connections that no longer serve any stream part.
//!
//! Two independent paths lead to a disconnect:
//!
//! - `schedule_disconnection_if_no_shared_stream_parts` arms a one-shot
//!   timer; when it fires the condition is checked again and the peer is
//!   dropped only if it still shares nothing with us.
//! - A periodic sweep drops every connected peer without shared stream
//!   parts, whether or not a timer was ever armed for it.

use parking_lot::Mutex;
use shared_types::NodeId;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, trace};

/// Reason passed to the transport for every disconnect made here.
pub const NO_SHARED_STREAM_PARTS: &str = "no shared stream parts";

/// What the manager needs from the rest of the node.
pub trait DisconnectionPort: Send + Sync + 'static {
    /// Peers the transport currently holds connections to.
    fn get_all_node_ids(&self) -> Vec<NodeId>;

    fn has_shared_stream_parts(&self, node_id: &NodeId) -> bool;

    /// Start dropping the connection; must not block.
    fn disconnect(&self, node_id: &NodeId, reason: &str);
}

pub struct DisconnectionManager<P: DisconnectionPort> {
    inner: Arc<DisconnectionInner<P>>,
}

struct DisconnectionInner<P: DisconnectionPort> {
    port: P,
    disconnection_delay: Duration,
    clean_up_interval: Duration,
    timers: Mutex<DisconnectionTimers>,
}

#[derive(Default)]
struct DisconnectionTimers {
    /// Pending one-shot timers, tagged so a fired timer only clears itself.
    by_node: HashMap<NodeId, (u64, JoinHandle<()>)>,
    next_epoch: u64,
    sweep: Option<JoinHandle<()>>,
    stopped: bool,
}

impl<P: DisconnectionPort> Clone for DisconnectionManager<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P: DisconnectionPort> DisconnectionManager<P> {
    pub fn new(port: P, disconnection_delay: Duration, clean_up_interval: Duration) -> Self {
        Self {
            inner: Arc::new(DisconnectionInner {
                port,
                disconnection_delay,
                clean_up_interval,
                timers: Mutex::new(DisconnectionTimers::default()),
            }),
        }
    }

    /// Start the periodic sweep. The first sweep runs one interval from now.
    pub fn start(&self) {
        let mut timers = self.inner.timers.lock();
        if timers.stopped {
            return;
        }
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            let period = inner.clean_up_interval;
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                inner.sweep();
            }
        });
        if let Some(previous) = timers.sweep.replace(handle) {
            previous.abort();
        }
    }

    /// Arm a disconnect timer for `node_id` unless it shares a stream part
    /// with us. Re-arming replaces any pending timer.
    pub fn schedule_disconnection_if_no_shared_stream_parts(&self, node_id: &NodeId) {
        if self.inner.port.has_shared_stream_parts(node_id) {
            return;
        }
        let mut timers = self.inner.timers.lock();
        if timers.stopped {
            return;
        }
        let epoch = timers.next_epoch;
        timers.next_epoch = timers.next_epoch.wrapping_add(1);

        let inner = Arc::clone(&self.inner);
        let node = node_id.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(inner.disconnection_delay).await;
            inner.on_timer_fired(&node, epoch);
        });
        if let Some((_, previous)) = timers.by_node.insert(node_id.clone(), (epoch, handle)) {
            previous.abort();
        }
        trace!(
            node_id = %node_id,
            delay_ms = self.inner.disconnection_delay.as_millis() as u64,
            "Scheduled disconnection"
        );
    }

    /// Idempotent.
    pub fn cancel_scheduled_disconnection(&self, node_id: &NodeId) {
        if let Some((_, handle)) = self.inner.timers.lock().by_node.remove(node_id) {
            handle.abort();
            trace!(node_id = %node_id, "Cancelled scheduled disconnection");
        }
    }

    pub fn stop(&self) {
        let mut timers = self.inner.timers.lock();
        timers.stopped = true;
        if let Some(handle) = timers.sweep.take() {
            handle.abort();
        }
        for (_, (_, handle)) in timers.by_node.drain() {
            handle.abort();
        }
    }

    pub fn num_of_scheduled_disconnections(&self) -> usize {
        self.inner.timers.lock().by_node.len()
    }
}

impl<P: DisconnectionPort> DisconnectionInner<P> {
    fn on_timer_fired(&self, node_id: &NodeId, epoch: u64) {
        {
            let mut timers = self.timers.lock();
            match timers.by_node.get(node_id) {
                Some((current, _)) if *current == epoch => {
                    timers.by_node.remove(node_id);
                }
                _ => return,
            }
        }
        if !self.port.has_shared_stream_parts(node_id) {
            debug!(node_id = %node_id, "Disconnecting, no shared stream parts after delay");
            self.port.disconnect(node_id, NO_SHARED_STREAM_PARTS);
        }
    }

    fn sweep(&self) {
        let idle: Vec<NodeId> = self
            .port
            .get_all_node_ids()
            .into_iter()
            .filter(|node_id| !self.port.has_shared_stream_parts(node_id))
            .collect();
        if !idle.is_empty() {
            debug!(count = idle.len(), "Clean-up sweep disconnecting idle peers");
        }
        for node_id in idle {
            self.port.disconnect(&node_id, NO_SHARED_STREAM_PARTS);
        }
    }
}

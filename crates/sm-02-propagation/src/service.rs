//! # Propagation Service
//!
//! Fans first-seen messages out to neighbors.
//!
//! ## Strategy
//!
//! - Every target except the message source gets one send attempt per trigger.
//! - Sends run as independent tasks; there is no ordering across neighbors.
//! - A task completes after `min_propagation_targets` accepted sends.
//! - `on_neighbor_joined` re-offers every live task of the topic to the new
//!   neighbor.
//!
//! ## Thread Safety
//!
//! Cheap to clone; clones share the task store. The store lock is never held
//! across a send.

use parking_lot::Mutex;
use shared_types::{NodeId, StreamMessage, StreamPartId};
use std::sync::Arc;
use tracing::trace;

use crate::domain::{PropagationConfig, PropagationTask, PropagationTaskStore};
use crate::ports::outbound::NeighborSender;

pub struct Propagation<S: NeighborSender> {
    inner: Arc<PropagationInner<S>>,
}

struct PropagationInner<S: NeighborSender> {
    sender: S,
    store: Mutex<PropagationTaskStore>,
    min_propagation_targets: usize,
}

impl<S: NeighborSender> Clone for Propagation<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: NeighborSender> Propagation<S> {
    pub fn new(sender: S, config: PropagationConfig) -> Self {
        Self {
            inner: Arc::new(PropagationInner {
                sender,
                store: Mutex::new(PropagationTaskStore::new(config.ttl, config.max_messages)),
                min_propagation_targets: config.min_propagation_targets,
            }),
        }
    }

    /// Start forwarding a first-seen message to `targets`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn feed_unseen_message(
        &self,
        message: StreamMessage,
        targets: Vec<NodeId>,
        source: Option<NodeId>,
    ) {
        let task = PropagationTask::new(message, source);
        if self.inner.min_propagation_targets > 0 {
            self.inner.store.lock().add(task.clone());
        }
        for target in targets {
            if task.should_send_to(&target) {
                self.send_and_await_then_mark(target, task.message.clone());
            }
        }
    }

    /// Offer every live task of `stream_part_id` to a newly joined neighbor.
    pub fn on_neighbor_joined(&self, neighbor: &NodeId, stream_part_id: &StreamPartId) {
        let tasks = self.inner.store.lock().get(stream_part_id);
        for task in tasks {
            if task.should_send_to(neighbor) {
                self.send_and_await_then_mark(neighbor.clone(), task.message);
            }
        }
    }

    pub fn num_of_active_propagation_tasks(&self) -> usize {
        self.inner.store.lock().size()
    }

    // =========================================================================
    // HELPER FUNCTIONS
    // =========================================================================

    fn send_and_await_then_mark(&self, neighbor: NodeId, message: StreamMessage) {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            if let Err(e) = inner.sender.send_to_neighbor(&neighbor, &message).await {
                trace!(
                    message_id = %message.message_id,
                    neighbor = %neighbor,
                    error = %e,
                    "Propagation send failed"
                );
                return;
            }
            inner.on_sent(&message, neighbor);
        });
    }
}

impl<S: NeighborSender> PropagationInner<S> {
    fn on_sent(&self, message: &StreamMessage, neighbor: NodeId) {
        let mut store = self.store.lock();
        // The task may already be complete or evicted.
        let Some(handled) = store.mark_handled(&message.message_id, neighbor) else {
            return;
        };
        if handled >= self.min_propagation_targets {
            store.delete(&message.message_id);
            trace!(message_id = %message.message_id, handled, "Propagation complete");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::SendError;
    use async_trait::async_trait;
    use shared_types::{MessageId, StreamMessageContent};
    use std::collections::HashSet;
    use std::time::Duration;

    // =========================================================================
    // TEST FIXTURES
    // =========================================================================

    /// Records sends; neighbors in `failing` reject, neighbors in `hanging`
    /// never complete.
    #[derive(Default)]
    struct MockSender {
        sent: Mutex<Vec<(NodeId, u64)>>,
        failing: Mutex<HashSet<NodeId>>,
        hanging: HashSet<NodeId>,
    }

    #[async_trait]
    impl NeighborSender for Arc<MockSender> {
        async fn send_to_neighbor(
            &self,
            neighbor: &NodeId,
            message: &StreamMessage,
        ) -> Result<(), SendError> {
            if self.hanging.contains(neighbor) {
                std::future::pending::<()>().await;
            }
            if self.failing.lock().contains(neighbor) {
                return Err(SendError::NotConnected(neighbor.clone()));
            }
            self.sent
                .lock()
                .push((neighbor.clone(), message.message_id.timestamp));
            Ok(())
        }
    }

    fn node(id: &str) -> NodeId {
        NodeId::from(id)
    }

    fn nodes(ids: &[&str]) -> Vec<NodeId> {
        ids.iter().map(|id| node(id)).collect()
    }

    fn stream_part() -> StreamPartId {
        StreamPartId::new("stream", 0)
    }

    fn message(ts: u64) -> StreamMessage {
        StreamMessage {
            message_id: MessageId {
                stream_id: "stream".into(),
                stream_partition: 0,
                timestamp: ts,
                sequence_number: 0,
                publisher_id: "publisher".into(),
                msg_chain_id: "chain".into(),
            },
            prev_msg_ref: None,
            content: StreamMessageContent::Data { payload: vec![1] },
        }
    }

    fn propagation(sender: Arc<MockSender>, min: usize) -> Propagation<Arc<MockSender>> {
        Propagation::new(
            sender,
            PropagationConfig {
                min_propagation_targets: min,
                ..PropagationConfig::default()
            },
        )
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    fn sent_to(sender: &MockSender) -> Vec<NodeId> {
        let mut targets: Vec<NodeId> = sender.sent.lock().iter().map(|(n, _)| n.clone()).collect();
        targets.sort();
        targets
    }

    // =========================================================================
    // FEEDING
    // =========================================================================

    #[tokio::test(start_paused = true)]
    async fn test_feed_sends_to_all_targets_except_source() {
        let sender = Arc::new(MockSender::default());
        let propagation = propagation(Arc::clone(&sender), 3);

        propagation.feed_unseen_message(message(1), nodes(&["a", "b", "c"]), Some(node("b")));
        settle().await;

        assert_eq!(sent_to(&sender), nodes(&["a", "c"]));
        // Only two of three required sends succeeded.
        assert_eq!(propagation.num_of_active_propagation_tasks(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_task_completes_at_min_targets_while_others_pending() {
        let sender = Arc::new(MockSender {
            hanging: nodes(&["slow-1", "slow-2"]).into_iter().collect(),
            ..MockSender::default()
        });
        let propagation = propagation(Arc::clone(&sender), 2);

        propagation.feed_unseen_message(
            message(1),
            nodes(&["a", "slow-1", "b", "slow-2"]),
            None,
        );
        settle().await;

        assert_eq!(sent_to(&sender), nodes(&["a", "b"]));
        assert_eq!(propagation.num_of_active_propagation_tasks(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_min_targets_is_fire_and_forget() {
        let sender = Arc::new(MockSender::default());
        let propagation = propagation(Arc::clone(&sender), 0);

        propagation.feed_unseen_message(message(1), nodes(&["a"]), None);
        assert_eq!(propagation.num_of_active_propagation_tasks(), 0);
        settle().await;

        assert_eq!(sent_to(&sender), nodes(&["a"]));
        propagation.on_neighbor_joined(&node("late"), &stream_part());
        settle().await;
        assert_eq!(sender.sent.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_send_is_not_retried_by_itself() {
        let sender = Arc::new(MockSender::default());
        sender.failing.lock().insert(node("a"));
        let propagation = propagation(Arc::clone(&sender), 2);

        propagation.feed_unseen_message(message(1), nodes(&["a", "b"]), None);
        settle().await;
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(sent_to(&sender), nodes(&["b"]));
        assert_eq!(propagation.num_of_active_propagation_tasks(), 1);
    }

    // =========================================================================
    // NEIGHBOR JOIN
    // =========================================================================

    #[tokio::test(start_paused = true)]
    async fn test_neighbor_join_completes_pending_task() {
        let sender = Arc::new(MockSender::default());
        let propagation = propagation(Arc::clone(&sender), 2);

        propagation.feed_unseen_message(message(1), nodes(&["a"]), None);
        propagation.feed_unseen_message(message(2), nodes(&["a"]), None);
        settle().await;
        assert_eq!(propagation.num_of_active_propagation_tasks(), 2);

        propagation.on_neighbor_joined(&node("b"), &stream_part());
        settle().await;

        assert_eq!(propagation.num_of_active_propagation_tasks(), 0);
        assert_eq!(
            sender.sent.lock().iter().filter(|(n, _)| *n == node("b")).count(),
            2
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_neighbor_join_skips_source_and_handled() {
        let sender = Arc::new(MockSender::default());
        let propagation = propagation(Arc::clone(&sender), 3);

        propagation.feed_unseen_message(message(1), nodes(&["a"]), Some(node("src")));
        settle().await;

        propagation.on_neighbor_joined(&node("src"), &stream_part());
        propagation.on_neighbor_joined(&node("a"), &stream_part());
        propagation.on_neighbor_joined(&node("other-topic"), &StreamPartId::new("other", 0));
        settle().await;

        assert_eq!(sent_to(&sender), nodes(&["a"]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_failure_on_rejoin() {
        let sender = Arc::new(MockSender::default());
        sender.failing.lock().insert(node("a"));
        let propagation = propagation(Arc::clone(&sender), 1);

        propagation.feed_unseen_message(message(1), nodes(&["a"]), None);
        settle().await;
        assert_eq!(propagation.num_of_active_propagation_tasks(), 1);

        sender.failing.lock().clear();
        propagation.on_neighbor_joined(&node("a"), &stream_part());
        settle().await;

        assert_eq!(propagation.num_of_active_propagation_tasks(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_task_not_retried() {
        let sender = Arc::new(MockSender::default());
        let propagation = propagation(Arc::clone(&sender), 2);

        propagation.feed_unseen_message(message(1), Vec::new(), None);
        tokio::time::sleep(Duration::from_secs(31)).await;
        propagation.on_neighbor_joined(&node("b"), &stream_part());
        settle().await;

        assert!(sender.sent.lock().is_empty());
    }
}

//! Store of in-flight propagation tasks.
//!
//! Insertion-ordered with two eviction paths: entries older than `ttl` are
//! purged lazily on access, and inserting beyond `max_tasks` drops the oldest
//! entry. Evicted tasks are simply forgotten.

use shared_types::{MessageId, NodeId, StreamMessage, StreamPartId};
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;
use tokio::time::Instant;

/// A first-seen message still being forwarded.
#[derive(Debug, Clone)]
pub struct PropagationTask {
    pub message: StreamMessage,
    pub source: Option<NodeId>,
    pub handled_neighbors: HashSet<NodeId>,
}

impl PropagationTask {
    pub fn new(message: StreamMessage, source: Option<NodeId>) -> Self {
        Self {
            message,
            source,
            handled_neighbors: HashSet::new(),
        }
    }

    /// True if the task still needs to be offered to `neighbor`.
    pub fn should_send_to(&self, neighbor: &NodeId) -> bool {
        self.source.as_ref() != Some(neighbor) && !self.handled_neighbors.contains(neighbor)
    }
}

#[derive(Debug)]
struct StoredTask {
    task: PropagationTask,
    seq: u64,
    inserted_at: Instant,
}

#[derive(Debug)]
pub struct PropagationTaskStore {
    ttl: Duration,
    max_tasks: usize,
    next_seq: u64,
    tasks: HashMap<MessageId, StoredTask>,
    /// `(seq, id)` in insertion order; entries whose seq no longer matches
    /// the stored task are stale and skipped.
    order: VecDeque<(u64, MessageId)>,
    stream_part_lookup: HashMap<StreamPartId, HashSet<MessageId>>,
}

impl PropagationTaskStore {
    pub fn new(ttl: Duration, max_tasks: usize) -> Self {
        Self {
            ttl,
            max_tasks,
            next_seq: 0,
            tasks: HashMap::new(),
            order: VecDeque::new(),
            stream_part_lookup: HashMap::new(),
        }
    }

    /// Insert a task, replacing any task for the same message.
    pub fn add(&mut self, task: PropagationTask) {
        self.purge_expired();
        let message_id = task.message.message_id.clone();
        self.remove(&message_id);
        while self.tasks.len() >= self.max_tasks.max(1) {
            if !self.evict_oldest() {
                break;
            }
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.stream_part_lookup
            .entry(message_id.stream_part_id())
            .or_default()
            .insert(message_id.clone());
        self.order.push_back((seq, message_id.clone()));
        self.tasks.insert(
            message_id,
            StoredTask {
                task,
                seq,
                inserted_at: Instant::now(),
            },
        );
        self.compact_order();
    }

    /// Snapshot of the live tasks of one topic.
    pub fn get(&mut self, stream_part_id: &StreamPartId) -> Vec<PropagationTask> {
        self.purge_expired();
        self.stream_part_lookup
            .get(stream_part_id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.tasks.get(id))
            .map(|stored| stored.task.clone())
            .collect()
    }

    /// Record a successful send. Returns the handled count, or `None` when
    /// the task is no longer stored.
    pub fn mark_handled(&mut self, message_id: &MessageId, neighbor: NodeId) -> Option<usize> {
        let stored = self.tasks.get_mut(message_id)?;
        stored.task.handled_neighbors.insert(neighbor);
        Some(stored.task.handled_neighbors.len())
    }

    pub fn delete(&mut self, message_id: &MessageId) {
        self.remove(message_id);
    }

    pub fn size(&mut self) -> usize {
        self.purge_expired();
        self.tasks.len()
    }

    // =========================================================================
    // HELPER FUNCTIONS
    // =========================================================================

    fn remove(&mut self, message_id: &MessageId) -> bool {
        if self.tasks.remove(message_id).is_none() {
            return false;
        }
        let stream_part_id = message_id.stream_part_id();
        if let Some(ids) = self.stream_part_lookup.get_mut(&stream_part_id) {
            ids.remove(message_id);
            if ids.is_empty() {
                self.stream_part_lookup.remove(&stream_part_id);
            }
        }
        true
    }

    fn is_live(&self, seq: u64, message_id: &MessageId) -> bool {
        self.tasks
            .get(message_id)
            .is_some_and(|stored| stored.seq == seq)
    }

    fn evict_oldest(&mut self) -> bool {
        while let Some((seq, message_id)) = self.order.pop_front() {
            if self.is_live(seq, &message_id) {
                self.remove(&message_id);
                return true;
            }
        }
        false
    }

    fn purge_expired(&mut self) {
        let now = Instant::now();
        while let Some((seq, message_id)) = self.order.front() {
            let expired = match self.tasks.get(message_id) {
                Some(stored) if stored.seq == *seq => {
                    now.duration_since(stored.inserted_at) >= self.ttl
                }
                _ => true,
            };
            if !expired {
                break;
            }
            if let Some((seq, message_id)) = self.order.pop_front() {
                if self.is_live(seq, &message_id) {
                    self.remove(&message_id);
                }
            }
        }
    }

    fn compact_order(&mut self) {
        if self.order.len() > self.max_tasks.max(16).saturating_mul(2) {
            let tasks = &self.tasks;
            self.order.retain(|(seq, id)| {
                tasks.get(id).is_some_and(|stored| stored.seq == *seq)
            });
        }
    }
}

//! # SM-02 Propagation Task Store Benchmarks
//!
//! Every unseen message becomes a task; every neighbor join looks tasks up
//! by stream part.
//!
//! Conditions:
//! - Inserting past capacity (oldest-first eviction on every add)
//! - Lookup by stream part with many live tasks spread over topics

use criterion::{black_box, BenchmarkId, Criterion, Throughput};
use shared_types::{MessageId, NodeId, StreamMessage, StreamMessageContent, StreamPartId};
use sm_02_propagation::{PropagationTask, PropagationTaskStore};
use std::time::Duration;

const NUM_OF_TOPICS: u32 = 16;

fn task(n: u64) -> PropagationTask {
    let message = StreamMessage {
        message_id: MessageId {
            stream_id: "bench".to_string(),
            stream_partition: (n % u64::from(NUM_OF_TOPICS)) as u32,
            timestamp: n,
            sequence_number: 0,
            publisher_id: "publisher".to_string(),
            msg_chain_id: "chain".to_string(),
        },
        prev_msg_ref: None,
        content: StreamMessageContent::Data {
            payload: vec![0u8; 64],
        },
    };
    PropagationTask::new(message, Some(NodeId::from("source")))
}

pub fn bench_propagation_store(c: &mut Criterion) {
    let mut group = c.benchmark_group("sm-02-propagation-store");
    group.measurement_time(Duration::from_secs(5));

    for capacity in [1_000usize, 10_000] {
        let tasks: Vec<PropagationTask> = (0..capacity as u64 * 2).map(task).collect();
        group.throughput(Throughput::Elements(tasks.len() as u64));
        group.bench_with_input(BenchmarkId::new("add_with_eviction", capacity), &tasks, |b, tasks| {
            b.iter(|| {
                let mut store = PropagationTaskStore::new(Duration::from_secs(30), capacity);
                for task in tasks {
                    store.add(task.clone());
                }
                black_box(store.size())
            })
        });

        let mut store = PropagationTaskStore::new(Duration::from_secs(30), capacity);
        for task in &tasks[..capacity] {
            store.add(task.clone());
        }
        group.throughput(Throughput::Elements(u64::from(NUM_OF_TOPICS)));
        group.bench_function(BenchmarkId::new("get_by_stream_part", capacity), |b| {
            b.iter(|| {
                for partition in 0..NUM_OF_TOPICS {
                    black_box(store.get(&StreamPartId::new("bench", partition)));
                }
            })
        });
    }

    group.finish();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_stays_within_capacity() {
        let mut store = PropagationTaskStore::new(Duration::from_secs(30), 100);
        for n in 0..250 {
            store.add(task(n));
        }

        assert_eq!(store.size(), 100);
        let per_topic = store.get(&StreamPartId::new("bench", 3)).len();
        assert!(per_topic > 0 && per_topic <= 100 / NUM_OF_TOPICS as usize + 1);
    }
}

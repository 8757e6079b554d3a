//! # SM-01 Duplicate Detection Benchmarks
//!
//! Every received message is checked against its publisher chain's gap
//! list, so the detector sits on the hottest path of the node.
//!
//! Conditions:
//! - In-order chains (the common case, one open-ended gap)
//! - Shuffled delivery windows that keep many gaps open
//! - Re-delivery of an already seen chain (all duplicates)

use criterion::{black_box, BenchmarkId, Criterion, Throughput};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use sm_01_stream_parts::{DuplicateMessageDetector, NumberPair, DEFAULT_MAX_NUMBER_OF_GAPS};
use std::time::Duration;

fn chain(len: u64) -> Vec<(Option<NumberPair>, NumberPair)> {
    (1..=len)
        .map(|n| ((n > 1).then(|| NumberPair::new(n - 1, 0)), NumberPair::new(n, 0)))
        .collect()
}

/// The chain with each window of `window` consecutive links shuffled. The
/// first link stays first so nothing precedes the detector's lower bound.
fn shuffled_chain(len: u64, window: usize) -> Vec<(Option<NumberPair>, NumberPair)> {
    let mut rng = rand::rngs::StdRng::seed_from_u64(7);
    let mut links = chain(len);
    for block in links[1..].chunks_mut(window) {
        block.shuffle(&mut rng);
    }
    links
}

pub fn bench_duplicate_detection(c: &mut Criterion) {
    let mut group = c.benchmark_group("sm-01-duplicate-detection");
    group.measurement_time(Duration::from_secs(5));

    for len in [1_000u64, 10_000] {
        let in_order = chain(len);
        group.throughput(Throughput::Elements(len));
        group.bench_with_input(BenchmarkId::new("in_order", len), &in_order, |b, links| {
            b.iter(|| {
                let mut detector = DuplicateMessageDetector::new(DEFAULT_MAX_NUMBER_OF_GAPS);
                for (previous, current) in links {
                    black_box(detector.mark_and_check(*previous, *current).ok());
                }
            })
        });

        let shuffled = shuffled_chain(len, 64);
        group.bench_with_input(BenchmarkId::new("shuffled_window_64", len), &shuffled, |b, links| {
            b.iter(|| {
                let mut detector = DuplicateMessageDetector::new(DEFAULT_MAX_NUMBER_OF_GAPS);
                for (previous, current) in links {
                    black_box(detector.mark_and_check(*previous, *current).ok());
                }
            })
        });

        group.bench_with_input(BenchmarkId::new("all_duplicates", len), &in_order, |b, links| {
            let mut detector = DuplicateMessageDetector::new(DEFAULT_MAX_NUMBER_OF_GAPS);
            for (previous, current) in links {
                let _ = detector.mark_and_check(*previous, *current);
            }
            b.iter(|| {
                for (previous, current) in links {
                    black_box(detector.mark_and_check(*previous, *current).ok());
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
    fn test_shuffled_chain_is_fully_unseen_once() {
        let mut detector = DuplicateMessageDetector::new(DEFAULT_MAX_NUMBER_OF_GAPS);
        let unseen = shuffled_chain(500, 16)
            .into_iter()
            .filter(|(previous, current)| detector.mark_and_check(*previous, *current) == Ok(true))
            .count();

        assert_eq!(unseen, 500);
        assert_eq!(detector.number_of_gaps(), 1);
    }
}

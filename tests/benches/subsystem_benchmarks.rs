//! # StreamMesh Subsystem Benchmarks
//!
//! | Subsystem | Hot path |
//! |-----------|----------|
//! | sm-01 Stream Parts | duplicate detection per received message |
//! | sm-02 Propagation | task store add and lookup per stream part |

use criterion::{criterion_group, criterion_main};
use sm_tests::benchmarks::{
    sm_01_duplicate_detection::bench_duplicate_detection,
    sm_02_propagation_store::bench_propagation_store,
};

criterion_group!(benches, bench_duplicate_detection, bench_propagation_store);
criterion_main!(benches);

//! # StreamMesh Benchmarks
//!
//! Hot paths of the data plane: every received message goes through the
//! duplicate detector, every unseen one through the propagation task store.

pub mod sm_01_duplicate_detection;
pub mod sm_02_propagation_store;

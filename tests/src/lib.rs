//! # StreamMesh Test Suite
//!
//! Unified test crate containing:
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! ├── benchmarks/       # Criterion benchmarks per subsystem
//! │   ├── sm_01_duplicate_detection.rs
//! │   └── sm_02_propagation_store.rs
//! │
//! └── integration/      # Several nodes on one simulated network
//!     ├── mesh.rs
//!     └── tracker_flows.rs
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! # All tests
//! cargo test -p sm-tests
//!
//! # By category
//! cargo test -p sm-tests integration::
//!
//! # Benchmarks
//! cargo bench -p sm-tests
//! ```

pub mod benchmarks;
pub mod integration;

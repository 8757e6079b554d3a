//! # Stream Parts Subsystem (sm-01)
//!
//! Owns the per-topic overlay state of a node: which peers are two-way
//! neighbors, which are one-way proxy links, the last applied tracker
//! counter, and one duplicate detector per publisher message chain.
//!
//! ## Architecture Role
//!
//! ```text
//! [Node] ──set up / add neighbor / mark numbers──→ [StreamPartManager]
//!                                                        │
//!                                  ┌─────────────────────┼──────────────┐
//!                                  ↓                     ↓              ↓
//!                           StreamPartEntry       StreamPartEntry      ...
//!                                  │
//!                                  ↓ (publisher, msg chain)
//!                        DuplicateMessageDetector
//! ```
//!
//! ## Invariants
//!
//! - A node is never both a two-way neighbor and a one-way link on one topic.
//! - Every accessor except `is_behind_proxy` fails on a topic that is not set up.
//! - Detector memory is bounded by `max_number_of_gaps` per message chain.

pub mod domain;
pub mod events;
pub mod service;

pub use domain::*;
pub use events::{DetectorError, StreamPartError};
pub use service::{RemovedNode, StreamPartManager};

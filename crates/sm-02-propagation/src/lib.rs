//! # Propagation Subsystem (sm-02)
//!
//! Forwards first-seen messages to neighbors until a minimum number of them
//! has accepted each message.
//!
//! ## Architecture Role
//!
//! ```text
//! [Node] ──feed_unseen_message──→ [Propagation] ──send_to_neighbor──→ [Peer A]
//!    │                                 │          ──send_to_neighbor──→ [Peer B]
//!    └──on_neighbor_joined────────────→│
//!                                      ↓
//!                            [PropagationTaskStore]
//!                     (FIFO, TTL + max-count eviction)
//! ```
//!
//! A task is dropped once `min_propagation_targets` distinct neighbors have
//! accepted the message. Failed sends are not retried on their own; a later
//! neighbor join retries every live task of that topic.

pub mod domain;
pub mod events;
pub mod ports;
pub mod service;

pub use domain::*;
pub use events::SendError;
pub use ports::outbound::NeighborSender;
pub use service::Propagation;

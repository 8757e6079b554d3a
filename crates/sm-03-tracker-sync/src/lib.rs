//! # Tracker Sync Subsystem (sm-03)
//!
//! Keeps a node's per-topic neighbor sets converging on what its trackers
//! instruct, and keeps trackers informed of the node's actual state.
//!
//! ## Architecture Role
//!
//! ```text
//! [Tracker] ──InstructionMessage──→ [NodeToTracker] ──event──→ [TrackerManager]
//!                                                                   │
//!                                            ┌──────────────────────┤
//!                                            ↓                      ↓
//!                                 [InstructionThrottler]  [InstructionRetryManager]
//!                                   one handler per topic    periodic reattempts
//!                                            └──────────┬───────────┘
//!                                                       ↓
//!                                      handle_tracker_instruction
//!                                                       │
//!                               unsubscribe / connect+subscribe via [TopologySubscriber]
//!                                                       │
//!                                                       ↓
//! [Tracker] ←──StatusMessage────────────────────── send status
//! ```
//!
//! ## Guarantees
//!
//! - Instructions older than the last accepted one for a topic are dropped.
//! - At most one handler runs per topic, with at most one instruction
//!   queued behind it (the latest).
//! - Instructions from a tracker that does not own the topic are ignored.

pub mod connector;
pub mod domain;
pub mod events;
pub mod ports;
pub mod retry;
pub mod service;
pub mod throttler;

pub use connector::TrackerConnector;
pub use domain::*;
pub use events::{NodeToTrackerEvent, TrackerSyncError, TrackerTransportError};
pub use ports::outbound::{InstructionHandler, NodeToTracker, TopologySubscriber};
pub use retry::InstructionRetryManager;
pub use service::TrackerManager;
pub use throttler::InstructionThrottler;

//! # StreamMesh Node Runtime
//!
//! Assembles the subsystems into a running overlay node.
//!
//! ```text
//!            tracker instructions                    data from neighbors
//!                    │                                        │
//!                    ▼                                        ▼
//! ┌──────────────────────────────────┐      ┌──────────────────────────────────┐
//! │ sm-03 TrackerManager             │      │ Node::on_data_received           │
//! │  throttler · retry · connector   │      │  duplicate detection (sm-01)     │
//! └───────────────┬──────────────────┘      └───────────────┬──────────────────┘
//!                 │ TopologySubscriber                      │ unseen
//!                 ▼                                         ▼
//! ┌──────────────────────────────────┐      ┌──────────────────────────────────┐
//! │ sm-01 StreamPartManager          │◄─────│ sm-02 Propagation                │
//! │  neighbors per stream part       │      │  re-send on neighbor join        │
//! └───────────────┬──────────────────┘      └──────────────────────────────────┘
//!                 │ no shared stream parts
//!                 ▼
//! ┌──────────────────────────────────┐
//! │ DisconnectionManager             │
//! └──────────────────────────────────┘
//! ```
//!
//! Everything observable is published as a [`shared_bus::NodeEvent`] on the
//! node's event bus.

pub mod adapters;
pub mod container;
pub mod disconnection;
pub mod errors;
pub mod logging;
pub mod node;
pub mod ports;
pub mod wiring;

pub use adapters::{SimulatedNetwork, SimulatedNodeToNode, SimulatedNodeToTracker};
pub use container::{ConfigError, NodeConfig};
pub use disconnection::{DisconnectionManager, DisconnectionPort};
pub use errors::{NodeError, TransportError};
pub use logging::{init_tracing, LoggingError};
pub use node::{random_node_id, Node};
pub use ports::{NoProxyConnections, NodeToNode, NodeToNodeEvent, ProxyConnections, ProxyDirection};

//! # Adapter Implementations
//!
//! Concrete implementations of the node's outbound ports.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    OUTER LAYER (Adapters)                       │
//! │   SimulatedNodeToNode, SimulatedNodeToTracker                   │
//! └─────────────────────────────────────────────────────────────────┘
//!                           ↑ implements ↑
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    MIDDLE LAYER (Ports)                         │
//! │   trait NodeToNode, trait NodeToTracker, trait ProxyConnections │
//! └─────────────────────────────────────────────────────────────────┘
//!                             ↑ uses ↑
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Node orchestrator                        │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Real WebSocket/WebRTC transports live outside this crate and plug in
//! through the same traits.

pub mod simulator;

pub use simulator::{SimulatedNetwork, SimulatedNodeToNode, SimulatedNodeToTracker};

//! Ports (SPI) the node consumes.
//!
//! The tracker transport port lives with the tracker sync subsystem
//! (`sm_03_tracker_sync::NodeToTracker`); the ports here cover the
//! node-to-node transport and the proxy connection layer.

pub mod outbound;

pub use outbound::{NoProxyConnections, NodeToNode, NodeToNodeEvent, ProxyConnections, ProxyDirection};

//! # Integration Flows
//!
//! Several nodes on one `SimulatedNetwork`, each with its own simulated
//! tracker connection. Topology comes from injected tracker instructions.

pub mod harness;
pub mod mesh;
pub mod tracker_flows;

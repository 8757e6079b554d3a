//! # Node Container
//!
//! Configuration for a node and the subsystems it owns.

pub mod config;

pub use config::{ConfigError, NodeConfig};

//! # Shared Types Crate
//!
//! Identifiers, the stream message model and the node <-> tracker protocol
//! messages used across every StreamMesh subsystem.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: types crossing a subsystem boundary live here.
//! - **Opaque identity**: `NodeId` and `TrackerId` are compared, hashed and
//!   printed, never interpreted.
//! - **Wire shape**: protocol messages serialize to the camelCase JSON shape
//!   trackers expect.

pub mod entities;
pub mod errors;
pub mod protocol;

pub use entities::*;
pub use errors::*;
pub use protocol::*;

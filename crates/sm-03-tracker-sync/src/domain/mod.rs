//! Domain layer for sm-03.

pub mod registry;
pub mod value_objects;

pub use registry::TrackerRegistry;
pub use value_objects::{QueuedInstruction, SharedStreamParts, TrackerManagerConfig};

//! Domain layer for sm-02.

pub mod task_store;
pub mod value_objects;

pub use task_store::{PropagationTask, PropagationTaskStore};
pub use value_objects::{PropagationConfig, DEFAULT_MAX_NEIGHBOR_COUNT};

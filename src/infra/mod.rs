//! Infrastructure adapters for queues, artifact storage and subprocess
//! introspection.

pub mod artifact;
pub mod introspect;
pub mod queue;
pub use artifact::{FilesystemArtifactStore, InMemoryArtifactStore};
pub use introspect::ProcessIntrospector;
pub use queue::{InMemoryQueueFactory, JsonlQueueFactory};

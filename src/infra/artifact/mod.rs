//! Artifact store backends.
pub mod fs;
pub mod memory;
pub use fs::FilesystemArtifactStore;
pub use memory::InMemoryArtifactStore;

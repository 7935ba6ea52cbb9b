//! Builders to construct service components from configuration.

pub mod service_builder;

pub use service_builder::{build_components, build_queue_factory, Components};

//! Configuration models for the service, its backends and worker runner.

pub mod service;

pub use service::{QueueBackendConfig, RunnerConfig, ServiceConfig, VersionOrderConfig};

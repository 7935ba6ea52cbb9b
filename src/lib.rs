//! # crawld
//!
//! Job scheduling and execution core for a single-node crawler service.
//!
//! Packaged crawler projects are stored as versioned artifacts. Crawl
//! requests are queued per project and started as isolated worker processes
//! under a concurrency cap. Every job moves through pending, running and
//! finished exactly once, and a cached spider list per project is kept until
//! the caller invalidates it.
//!
//! ## Components
//!
//! - [`core::ArtifactStore`]: versioned packages, "current" chosen by a
//!   pluggable [`core::VersionOrder`]
//! - [`core::ProjectQueue`]: per-project FIFO, file-backed or in memory
//! - [`core::JobTracker`]: job state machine and consistent snapshots
//! - [`core::Launcher`]: poll-and-reap control loop over worker slots
//! - [`core::SpiderListCache`]: explicit-invalidation spider list cache
//! - [`core::Scheduler`]: validated submission and cancellation
//! - [`runtime::Service`]: wires everything from a [`config::ServiceConfig`]
//!
//! ```rust,ignore
//! use crawld::config::ServiceConfig;
//! use crawld::core::{ScheduleRequest, ShutdownMode};
//! use crawld::runtime::Service;
//!
//! crawld::util::init_tracing();
//! let service = Service::start(ServiceConfig::from_env()?)?;
//! service.artifacts().put("mybot", "r1", &egg_bytes)?;
//! let job_id = service.schedule(ScheduleRequest::new("mybot", "spider1")).await?;
//! service.shutdown(ShutdownMode::Detach).await?;
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Builders to construct service components from configuration.
pub mod builders;
/// Configuration models for the service, backends and worker runner.
pub mod config;
/// Core scheduling abstractions: jobs, queues, artifacts and the launcher.
pub mod core;
/// Infrastructure adapters for queues, artifact storage and introspection.
pub mod infra;
/// Service runtime and API surface.
pub mod runtime;
/// Shared utilities.
pub mod util;

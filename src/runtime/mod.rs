//! Service runtime and API surface.

pub mod api;
pub mod service;

pub use api::{daemon_status, health, list_jobs, DaemonStatus, JobListing, JobSummary};
pub use service::Service;

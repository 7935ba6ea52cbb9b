//! Core scheduling abstractions: jobs, queues, artifacts and the launcher.

pub mod artifact;
pub mod error;
pub mod events;
pub mod job;
pub mod launcher;
pub mod queue;
pub mod runner;
pub mod scheduler;
pub mod spiders;
pub mod tracker;
pub mod validate;
pub mod version;

pub use artifact::{Artifact, ArtifactStore};
pub use error::{AppResult, CoreError, CoreResult, ValidationError};
pub use events::{InMemoryEventSink, JobEvent, JobEventKind, JobEventSink, TracingEventSink};
pub use job::{new_job_id, JobId, JobOutcome, JobRecord, JobRequest, JobSnapshot, JobState};
pub use launcher::{Launcher, LauncherConfig, LauncherHandle, LauncherStats, ShutdownMode, TerminateTarget};
pub use queue::{ProjectQueue, QueueFactory};
pub use scheduler::{Cancelled, ScheduleRequest, Scheduler};
pub use spiders::{SpiderIntrospector, SpiderListCache};
pub use tracker::{JobTracker, NewJob};
pub use version::{Lexicographic, Natural, VersionOrder};

//! Component construction from a validated configuration.

use std::sync::Arc;

use crate::config::{QueueBackendConfig, ServiceConfig};
use crate::core::{
    ArtifactStore, CoreError, CoreResult, JobEventSink, JobTracker, QueueFactory, SpiderIntrospector,
    TracingEventSink,
};
use crate::infra::{FilesystemArtifactStore, InMemoryQueueFactory, JsonlQueueFactory, ProcessIntrospector};

/// Shared pieces every service instance is made of.
pub struct Components {
    /// Artifact store.
    pub artifacts: Arc<dyn ArtifactStore>,
    /// Job tracker with its project queues.
    pub tracker: Arc<JobTracker>,
    /// Spider introspector.
    pub introspector: Arc<dyn SpiderIntrospector>,
    /// Receiver of job lifecycle events.
    pub events: Arc<dyn JobEventSink>,
}

/// Queue factory for the configured backend.
pub fn build_queue_factory(cfg: &ServiceConfig) -> Box<dyn QueueFactory> {
    match cfg.queue {
        QueueBackendConfig::InMemory => Box::new(InMemoryQueueFactory),
        QueueBackendConfig::File => Box::new(JsonlQueueFactory::new(cfg.queues_dir.clone())),
    }
}

/// Validate `cfg` and build the artifact store, tracker and introspector.
/// Job events go to the tracing log; swap `events` for another sink before
/// starting the service to capture them.
pub fn build_components(cfg: &ServiceConfig) -> CoreResult<Components> {
    cfg.validate().map_err(CoreError::Config)?;

    let artifacts: Arc<dyn ArtifactStore> = Arc::new(FilesystemArtifactStore::with_order(
        cfg.artifacts_dir.clone(),
        cfg.version_order.build(),
    ));
    let tracker = Arc::new(JobTracker::new(build_queue_factory(cfg), cfg.finished_to_keep)?);
    let introspector: Arc<dyn SpiderIntrospector> = Arc::new(ProcessIntrospector::new(
        Arc::clone(&artifacts),
        cfg.runner.clone(),
        cfg.work_dir.clone(),
        cfg.introspection_timeout(),
    ));

    Ok(Components {
        artifacts,
        tracker,
        introspector,
        events: Arc::new(TracingEventSink),
    })
}

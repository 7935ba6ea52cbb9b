//! The service object: owns the shared components and the launcher task.

use std::sync::Arc;

use anyhow::Context;
use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::builders::{build_components, Components};
use crate::config::ServiceConfig;
use crate::core::{
    AppResult, ArtifactStore, Cancelled, CoreResult, JobId, JobSnapshot, JobTracker, Launcher, LauncherConfig,
    JobEventSink, LauncherHandle, LauncherStats, ScheduleRequest, Scheduler, ShutdownMode,
    SpiderIntrospector, SpiderListCache,
};

/// Running crawl service. Create with [`Service::start`], stop with
/// [`Service::shutdown`].
pub struct Service {
    config: ServiceConfig,
    artifacts: Arc<dyn ArtifactStore>,
    tracker: Arc<JobTracker>,
    spiders: Arc<SpiderListCache>,
    introspector: Arc<dyn SpiderIntrospector>,
    scheduler: Scheduler,
    launcher: LauncherHandle,
    launcher_task: Mutex<Option<JoinHandle<()>>>,
}

impl Service {
    /// Build components from `config` and start the launcher. Must be called
    /// inside a tokio runtime.
    pub fn start(config: ServiceConfig) -> CoreResult<Self> {
        let components = build_components(&config)?;
        Ok(Self::start_with(config, components))
    }

    /// Start from `.env` and `CRAWLD_*` variables.
    pub fn from_env() -> AppResult<Self> {
        let config = ServiceConfig::from_env()
            .map_err(anyhow::Error::msg)
            .context("loading configuration from environment")?;
        Self::start(config).context("starting service")
    }

    /// Start with caller-provided components.
    pub fn start_with(config: ServiceConfig, components: Components) -> Self {
        let Components {
            artifacts,
            tracker,
            introspector,
            events,
        } = components;
        let spiders = Arc::new(SpiderListCache::new());
        let mut scheduler =
            Scheduler::new(Arc::clone(&artifacts), Arc::clone(&tracker)).with_events(Arc::clone(&events));
        if config.verify_spiders {
            scheduler = scheduler.with_spider_check(Arc::clone(&spiders), Arc::clone(&introspector));
        }
        let (launcher, task) = Launcher::spawn(
            LauncherConfig::from_service(&config),
            Arc::clone(&tracker),
            Arc::clone(&artifacts),
            events,
        );
        tracing::info!(
            slots = launcher.stats().slots,
            queue = ?config.queue,
            version_order = ?config.version_order,
            "service started"
        );
        Self {
            config,
            artifacts,
            tracker,
            spiders,
            introspector,
            scheduler,
            launcher,
            launcher_task: Mutex::new(Some(task)),
        }
    }

    /// Active configuration.
    pub const fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Artifact store.
    pub fn artifacts(&self) -> &Arc<dyn ArtifactStore> {
        &self.artifacts
    }

    /// Job tracker.
    pub const fn tracker(&self) -> &Arc<JobTracker> {
        &self.tracker
    }

    /// Spider list cache.
    pub const fn spider_cache(&self) -> &Arc<SpiderListCache> {
        &self.spiders
    }

    /// Launcher control handle.
    pub const fn launcher(&self) -> &LauncherHandle {
        &self.launcher
    }

    /// Queue a crawl.
    pub async fn schedule(&self, request: ScheduleRequest) -> CoreResult<JobId> {
        self.scheduler.schedule(request).await
    }

    /// Cancel a pending or running job.
    pub async fn cancel(&self, project: &str, job_id: &str) -> CoreResult<Cancelled> {
        self.scheduler.cancel(project, job_id, &self.launcher).await
    }

    /// Spider names for `project`, served from the cache when present.
    pub async fn list_spiders(&self, project: &str, version: Option<&str>) -> CoreResult<Vec<String>> {
        self.spiders
            .get_or_populate(project, version, self.introspector.as_ref())
            .await
    }

    /// Remove a project's artifacts and pending jobs. The spider cache is
    /// left alone; call [`SpiderListCache::invalidate`] for freshness.
    pub fn delete_project(&self, project: &str) -> CoreResult<usize> {
        self.artifacts.delete_project(project)?;
        self.tracker.clear_project(project)
    }

    /// All jobs by state.
    pub fn jobs(&self) -> JobSnapshot {
        self.tracker.snapshot()
    }

    /// Launcher counters.
    pub fn stats(&self) -> LauncherStats {
        self.launcher.stats()
    }

    /// Stop the launcher with `mode` and wait for its task to end.
    pub async fn shutdown(&self, mode: ShutdownMode) -> CoreResult<()> {
        self.launcher.shutdown(mode).await?;
        let task = self.launcher_task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "launcher task ended abnormally");
            }
        }
        tracing::info!(?mode, "service stopped");
        Ok(())
    }
}

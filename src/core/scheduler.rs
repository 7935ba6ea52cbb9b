//! Job submission and cancellation entry point.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::artifact::ArtifactStore;
use super::error::{CoreError, CoreResult};
use super::events::{JobEvent, JobEventKind, JobEventSink, TracingEventSink};
use super::job::{JobId, JobRecord};
use super::launcher::{LauncherHandle, TerminateTarget};
use super::spiders::{SpiderIntrospector, SpiderListCache};
use super::tracker::{JobTracker, NewJob};
use super::validate;

/// A crawl submission.
#[derive(Debug, Clone, Default)]
pub struct ScheduleRequest {
    /// Project name.
    pub project: String,
    /// Spider name.
    pub spider: String,
    /// Pinned version.
    pub version: Option<String>,
    /// Settings overrides.
    pub settings: BTreeMap<String, String>,
    /// Spider arguments.
    pub args: BTreeMap<String, String>,
    /// Caller-chosen job id.
    pub job_id: Option<JobId>,
}

impl ScheduleRequest {
    /// Request for `spider` of `project`.
    pub fn new(project: impl Into<String>, spider: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            spider: spider.into(),
            ..Self::default()
        }
    }
}

/// Result of [`Scheduler::cancel`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cancelled {
    /// Removed from the queue before it started.
    Pending(JobRecord),
    /// Its worker was sent a kill; it finishes on the next reap.
    Running(JobId),
}

/// Validates and enqueues crawl requests.
pub struct Scheduler {
    artifacts: Arc<dyn ArtifactStore>,
    tracker: Arc<JobTracker>,
    spider_check: Option<(Arc<SpiderListCache>, Arc<dyn SpiderIntrospector>)>,
    events: Arc<dyn JobEventSink>,
}

impl Scheduler {
    /// Scheduler that does not verify spider names.
    pub fn new(artifacts: Arc<dyn ArtifactStore>, tracker: Arc<JobTracker>) -> Self {
        Self {
            artifacts,
            tracker,
            spider_check: None,
            events: Arc::new(TracingEventSink),
        }
    }

    /// Report scheduled and pending-cancel events to `events`.
    #[must_use]
    pub fn with_events(mut self, events: Arc<dyn JobEventSink>) -> Self {
        self.events = events;
        self
    }

    /// Also require the spider to appear in the project's (cached) spider
    /// list.
    #[must_use]
    pub fn with_spider_check(
        mut self,
        cache: Arc<SpiderListCache>,
        introspector: Arc<dyn SpiderIntrospector>,
    ) -> Self {
        self.spider_check = Some((cache, introspector));
        self
    }

    /// Validate `request` and queue it. Returns the job id.
    pub async fn schedule(&self, request: ScheduleRequest) -> CoreResult<JobId> {
        validate::project(&request.project)?;
        validate::spider(&request.spider)?;
        if let Some(version) = request.version.as_deref() {
            validate::version(version)?;
        }
        if let Some(job_id) = request.job_id.as_deref() {
            validate::job(job_id)?;
        }

        let versions = self.artifacts.list_versions(&request.project)?;
        if versions.is_empty() {
            tracing::warn!(project = %request.project, "schedule for unknown project");
            return Err(CoreError::NotFound(format!("project {}", request.project)));
        }
        if let Some(version) = request.version.as_deref() {
            if !versions.iter().any(|v| v == version) {
                return Err(CoreError::NotFound(format!(
                    "version {version} of project {}",
                    request.project
                )));
            }
        }

        if let Some((cache, introspector)) = &self.spider_check {
            let spiders = cache
                .get_or_populate(&request.project, None, introspector.as_ref())
                .await?;
            if !spiders.contains(&request.spider) {
                tracing::warn!(project = %request.project, spider = %request.spider, "unknown spider");
                return Err(CoreError::NotFound(format!(
                    "spider {} in project {}",
                    request.spider, request.project
                )));
            }
        }

        let (project, spider) = (request.project.clone(), request.spider.clone());
        let job_id = self.tracker.create(NewJob {
            project: request.project,
            spider: request.spider,
            version: request.version,
            settings: request.settings,
            args: request.args,
            job_id: request.job_id,
        })?;
        self.events
            .record(JobEvent::new(&job_id, &project, &spider, JobEventKind::Scheduled));
        Ok(job_id)
    }

    /// Cancel a job: drop it from the queue if still pending, otherwise ask
    /// the launcher to kill its worker.
    pub async fn cancel(&self, project: &str, job_id: &str, launcher: &LauncherHandle) -> CoreResult<Cancelled> {
        if let Some(record) = self.tracker.cancel_pending(project, job_id)? {
            self.events
                .record(JobEvent::for_record(&record, JobEventKind::Cancelled));
            return Ok(Cancelled::Pending(record));
        }
        let not_found = || CoreError::NotFound(format!("active job {job_id} in project {project}"));
        match self.tracker.get(job_id) {
            Some(record) if record.project() == project => {}
            _ => return Err(not_found()),
        }
        match launcher.terminate(TerminateTarget::Job(job_id.to_owned())).await? {
            Some(id) => Ok(Cancelled::Running(id)),
            None => Err(not_found()),
        }
    }

    /// Underlying tracker.
    pub fn tracker(&self) -> &Arc<JobTracker> {
        &self.tracker
    }
}

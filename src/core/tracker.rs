//! Job state tracking across pending, running and finished.
//!
//! Pending jobs live in their project's [`ProjectQueue`]; each queue has its
//! own mutex. Claimed, running and finished jobs live together behind one
//! state mutex. Lock order is always queue(s) before state, and a snapshot
//! takes every queue lock (in project order) before the state lock, so a
//! reader never sees a job in two collections or in none.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use super::error::{CoreError, CoreResult};
use super::job::{new_job_id, JobId, JobOutcome, JobRecord, JobRequest, JobSnapshot, JobState};
use super::queue::{ProjectQueue, QueueFactory};
use super::validate;
use crate::util::clock::now_ms;

type SharedQueue = Arc<Mutex<Box<dyn ProjectQueue>>>;

/// Parameters for a new job.
#[derive(Debug, Clone, Default)]
pub struct NewJob {
    /// Project name.
    pub project: String,
    /// Spider name.
    pub spider: String,
    /// Pinned version, or `None` for the highest at launch time.
    pub version: Option<String>,
    /// Settings overrides.
    pub settings: BTreeMap<String, String>,
    /// Spider arguments.
    pub args: BTreeMap<String, String>,
    /// Caller-chosen job id; generated when absent.
    pub job_id: Option<JobId>,
}

impl NewJob {
    /// Minimal job for `project`/`spider`.
    pub fn new(project: impl Into<String>, spider: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            spider: spider.into(),
            ..Self::default()
        }
    }

    /// Pin a version.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Add a spider argument.
    #[must_use]
    pub fn with_arg(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.args.insert(key.into(), value.into());
        self
    }

    /// Add a settings override.
    #[must_use]
    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }

    /// Use a caller-chosen job id.
    #[must_use]
    pub fn with_job_id(mut self, job_id: impl Into<String>) -> Self {
        self.job_id = Some(job_id.into());
        self
    }
}

#[derive(Default)]
struct TrackerState {
    /// Popped from a queue by the launcher, not yet running. Reported as
    /// pending.
    claimed: HashMap<JobId, JobRecord>,
    running: HashMap<JobId, JobRecord>,
    /// Ascending by end time.
    finished: VecDeque<JobRecord>,
}

impl TrackerState {
    fn contains(&self, job_id: &str) -> bool {
        self.claimed.contains_key(job_id)
            || self.running.contains_key(job_id)
            || self.finished.iter().any(|j| j.id() == job_id)
    }

    fn push_finished(&mut self, record: JobRecord, cap: usize) -> usize {
        let end = record.end_time_ms;
        let index = self
            .finished
            .iter()
            .rposition(|j| j.end_time_ms <= end)
            .map_or(0, |i| i + 1);
        self.finished.insert(index, record);
        let mut evicted = 0;
        while self.finished.len() > cap {
            self.finished.pop_front();
            evicted += 1;
        }
        evicted
    }
}

/// Owns every job's lifecycle. Shared between the request path and the
/// launcher.
pub struct JobTracker {
    factory: Box<dyn QueueFactory>,
    queues: RwLock<BTreeMap<String, SharedQueue>>,
    state: Mutex<TrackerState>,
    /// Serializes creates that carry a caller-chosen id so the uniqueness
    /// check and the push happen together.
    custom_ids: Mutex<()>,
    finished_to_keep: usize,
}

impl JobTracker {
    /// Create a tracker and reopen every queue the factory already knows, so
    /// pending jobs from a previous run resume.
    pub fn new(factory: Box<dyn QueueFactory>, finished_to_keep: usize) -> CoreResult<Self> {
        let mut queues = BTreeMap::new();
        for project in factory.existing_projects()? {
            let queue = factory.open(&project)?;
            if !queue.is_empty() {
                tracing::info!(project = %project, pending = queue.len(), "resuming persisted queue");
            }
            queues.insert(project, Arc::new(Mutex::new(queue)));
        }
        Ok(Self {
            factory,
            queues: RwLock::new(queues),
            state: Mutex::new(TrackerState::default()),
            custom_ids: Mutex::new(()),
            finished_to_keep,
        })
    }

    /// Retention cap for finished jobs.
    pub const fn finished_to_keep(&self) -> usize {
        self.finished_to_keep
    }

    fn queue(&self, project: &str) -> Option<SharedQueue> {
        self.queues.read().get(project).cloned()
    }

    fn queue_or_open(&self, project: &str) -> CoreResult<SharedQueue> {
        if let Some(queue) = self.queue(project) {
            return Ok(queue);
        }
        let mut queues = self.queues.write();
        if let Some(queue) = queues.get(project) {
            return Ok(Arc::clone(queue));
        }
        let queue: SharedQueue = Arc::new(Mutex::new(self.factory.open(project)?));
        queues.insert(project.to_owned(), Arc::clone(&queue));
        Ok(queue)
    }

    fn id_in_use(&self, job_id: &str) -> bool {
        let queues: Vec<SharedQueue> = self.queues.read().values().cloned().collect();
        if queues
            .iter()
            .any(|q| q.lock().list().iter().any(|r| r.job_id == job_id))
        {
            return true;
        }
        self.state.lock().contains(job_id)
    }

    /// Enqueue a new pending job on its project's queue and return its id.
    pub fn create(&self, job: NewJob) -> CoreResult<JobId> {
        validate::project(&job.project)?;
        validate::spider(&job.spider)?;
        if let Some(version) = job.version.as_deref() {
            validate::version(version)?;
        }

        let _guard = match job.job_id.as_deref() {
            Some(id) => {
                validate::job(id)?;
                let guard = self.custom_ids.lock();
                if self.id_in_use(id) {
                    return Err(CoreError::InvalidTransition {
                        job_id: id.to_owned(),
                        reason: "job id already in use".into(),
                    });
                }
                Some(guard)
            }
            None => None,
        };

        let request = JobRequest {
            job_id: job.job_id.unwrap_or_else(new_job_id),
            project: job.project,
            spider: job.spider,
            version: job.version,
            settings: job.settings,
            args: job.args,
            created_at_ms: now_ms(),
        };
        let job_id = request.job_id.clone();
        let queue = self.queue_or_open(&request.project)?;
        tracing::info!(
            job_id = %job_id,
            project = %request.project,
            spider = %request.spider,
            "job queued"
        );
        queue.lock().push(request)?;
        Ok(job_id)
    }

    /// Atomically pop the head of `project`'s queue and hold it as claimed.
    /// A claimed job is still reported as pending until [`Self::mark_running`]
    /// or [`Self::fail_launch`].
    pub fn claim_next(&self, project: &str) -> CoreResult<Option<JobRecord>> {
        let Some(queue) = self.queue(project) else {
            return Ok(None);
        };
        let mut queue = queue.lock();
        let Some(request) = queue.pop()? else {
            return Ok(None);
        };
        let record = JobRecord::pending(request);
        self.state
            .lock()
            .claimed
            .insert(record.id().to_owned(), record.clone());
        drop(queue);
        Ok(Some(record))
    }

    /// Move a claimed job to running.
    ///
    /// Calling this twice for one job is a programmer error and is reported
    /// as [`CoreError::InvalidTransition`].
    pub fn mark_running(&self, job_id: &str, pid: u32) -> CoreResult<JobRecord> {
        self.mark_running_with_version(job_id, pid, None)
    }

    /// [`Self::mark_running`], also recording the artifact version launched.
    pub fn mark_running_with_version(
        &self,
        job_id: &str,
        pid: u32,
        version: Option<String>,
    ) -> CoreResult<JobRecord> {
        let mut state = self.state.lock();
        let Some(mut record) = state.claimed.remove(job_id) else {
            let reason = if state.running.contains_key(job_id) {
                "already running"
            } else if state.finished.iter().any(|j| j.id() == job_id) {
                "already finished"
            } else {
                "not claimed"
            };
            tracing::error!(job_id, reason, "mark_running rejected");
            return Err(CoreError::InvalidTransition {
                job_id: job_id.to_owned(),
                reason: reason.into(),
            });
        };
        record.state = JobState::Running;
        record.pid = Some(pid);
        record.start_time_ms = Some(now_ms());
        record.launched_version = version;
        state.running.insert(job_id.to_owned(), record.clone());
        Ok(record)
    }

    /// Move a running job to finished, evicting the oldest finished entries
    /// beyond the retention cap.
    pub fn mark_finished(&self, job_id: &str, outcome: JobOutcome) -> CoreResult<JobRecord> {
        let mut state = self.state.lock();
        let Some(mut record) = state.running.remove(job_id) else {
            tracing::error!(job_id, "mark_finished for a job that is not running");
            return Err(CoreError::InvalidTransition {
                job_id: job_id.to_owned(),
                reason: "not running".into(),
            });
        };
        record.state = JobState::Finished;
        record.end_time_ms = Some(now_ms());
        record.outcome = Some(outcome);
        let evicted = state.push_finished(record.clone(), self.finished_to_keep);
        if evicted > 0 {
            tracing::debug!(evicted, "evicted oldest finished jobs");
        }
        Ok(record)
    }

    /// Finish a claimed job whose worker could not be started. Start and end
    /// time are the same instant; the job is never visible as running.
    pub fn fail_launch(&self, job_id: &str, reason: impl Into<String>) -> CoreResult<JobRecord> {
        let mut state = self.state.lock();
        let Some(mut record) = state.claimed.remove(job_id) else {
            return Err(CoreError::InvalidTransition {
                job_id: job_id.to_owned(),
                reason: "not claimed".into(),
            });
        };
        let now = now_ms();
        record.state = JobState::Finished;
        record.start_time_ms = Some(now);
        record.end_time_ms = Some(now);
        record.outcome = Some(JobOutcome::LaunchFailed {
            reason: reason.into(),
        });
        state.push_finished(record.clone(), self.finished_to_keep);
        Ok(record)
    }

    /// Remove a still-queued job. Returns `None` if it is not in the queue
    /// (already claimed, running, finished or unknown).
    pub fn cancel_pending(&self, project: &str, job_id: &str) -> CoreResult<Option<JobRecord>> {
        validate::project(project)?;
        let Some(queue) = self.queue(project) else {
            return Ok(None);
        };
        let removed = queue.lock().remove(job_id)?;
        if removed.is_some() {
            tracing::info!(job_id, project, "pending job cancelled");
        }
        Ok(removed.map(JobRecord::pending))
    }

    /// Drop all pending jobs of a project (used when a project is deleted).
    pub fn clear_project(&self, project: &str) -> CoreResult<usize> {
        validate::project(project)?;
        match self.queue(project) {
            Some(queue) => queue.lock().clear(),
            None => Ok(0),
        }
    }

    /// Projects with a queue, in name order.
    pub fn projects(&self) -> Vec<String> {
        self.queues.read().keys().cloned().collect()
    }

    /// Number of queued requests for a project.
    pub fn pending_count(&self, project: &str) -> usize {
        self.queue(project).map_or(0, |q| q.lock().len())
    }

    /// Number of running jobs.
    pub fn running_count(&self) -> usize {
        self.state.lock().running.len()
    }

    /// Look up one job in any state.
    pub fn get(&self, job_id: &str) -> Option<JobRecord> {
        let snapshot = self.snapshot();
        snapshot
            .pending
            .into_iter()
            .chain(snapshot.running)
            .chain(snapshot.finished)
            .find(|j| j.id() == job_id)
    }

    /// Consistent view of all jobs.
    pub fn snapshot(&self) -> JobSnapshot {
        let queues = self.queues.read();
        let guards: Vec<_> = queues.values().map(|q| q.lock()).collect();
        let state = self.state.lock();

        let mut pending: Vec<JobRecord> = guards
            .iter()
            .flat_map(|q| q.list())
            .map(JobRecord::pending)
            .collect();
        let mut claimed: Vec<JobRecord> = state.claimed.values().cloned().collect();
        claimed.sort_by_key(|j| j.request.created_at_ms);
        pending.extend(claimed);

        let mut running: Vec<JobRecord> = state.running.values().cloned().collect();
        running.sort_by_key(|j| j.start_time_ms);

        let finished = state.finished.iter().rev().cloned().collect();
        JobSnapshot {
            pending,
            running,
            finished,
        }
    }

    /// Projects that currently have at least one queued request.
    pub fn projects_with_pending(&self) -> BTreeSet<String> {
        self.queues
            .read()
            .iter()
            .filter(|(_, q)| !q.lock().is_empty())
            .map(|(p, _)| p.clone())
            .collect()
    }
}

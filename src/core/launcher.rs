//! Bounded-concurrency worker launcher.
//!
//! A single control loop owns every worker process handle. Each tick it reaps
//! exited workers with a non-blocking `try_wait`, then fills idle slots by
//! claiming requests round-robin across projects. The loop never awaits a
//! worker, and no single job failure stops it.
//!
//! Callers talk to the loop through a cloneable [`LauncherHandle`].

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tempfile::NamedTempFile;
use tokio::process::Child;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::artifact::{Artifact, ArtifactStore};
use super::error::{CoreError, CoreResult};
use super::events::{JobEvent, JobEventKind, JobEventSink};
use super::job::{JobId, JobOutcome, JobRecord, JobRequest};
use super::runner::{self, crawl_args, materialize, worker_command};
use super::tracker::JobTracker;
use super::validate;
use crate::config::{RunnerConfig, ServiceConfig};

/// Launcher settings.
#[derive(Debug, Clone)]
pub struct LauncherConfig {
    /// Number of worker slots.
    pub max_concurrent_jobs: usize,
    /// Tick interval.
    pub poll_interval: Duration,
    /// Root for `<project>/<spider>/<job>.log`.
    pub logs_dir: PathBuf,
    /// Root for `<project>/<spider>/<job>.jl`, if items are collected.
    pub items_dir: Option<PathBuf>,
    /// Where artifacts are materialized for workers.
    pub work_dir: PathBuf,
    /// Worker program.
    pub runner: RunnerConfig,
}

impl LauncherConfig {
    /// Derive launcher settings from the service configuration.
    pub fn from_service(cfg: &ServiceConfig) -> Self {
        Self {
            max_concurrent_jobs: cfg.effective_max_jobs(),
            poll_interval: cfg.poll_interval(),
            logs_dir: cfg.logs_dir.clone(),
            items_dir: cfg.items_dir.clone(),
            work_dir: cfg.work_dir.clone(),
            runner: cfg.runner.clone(),
        }
    }
}

/// Which worker a termination request addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminateTarget {
    /// By job id.
    Job(JobId),
    /// By worker process id.
    Pid(u32),
}

/// What happens to live workers when the launcher stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownMode {
    /// Leave workers running; their jobs stay in the running collection.
    Detach,
    /// Kill every worker and wait up to `grace` for each to be reaped.
    Terminate {
        /// Upper bound on the reap wait per worker.
        grace: Duration,
    },
}

/// Point-in-time launcher counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LauncherStats {
    /// Configured slots.
    pub slots: usize,
    /// Slots with a live worker.
    pub active: usize,
    /// Workers spawned.
    pub started: u64,
    /// Workers that exited successfully.
    pub completed: u64,
    /// Workers that exited with a failure outcome, including cancels.
    pub failed: u64,
    /// Claimed requests that never got a worker.
    pub launch_failures: u64,
}

#[derive(Debug, Default)]
struct Counters {
    active: AtomicUsize,
    started: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    launch_failures: AtomicU64,
}

enum Command {
    Terminate {
        target: TerminateTarget,
        reply: oneshot::Sender<Option<JobId>>,
    },
    Shutdown {
        mode: ShutdownMode,
        reply: oneshot::Sender<()>,
    },
}

struct Worker {
    job_id: JobId,
    project: String,
    spider: String,
    pid: u32,
    child: Child,
    /// Materialized artifact; removed once the worker is reaped.
    _artifact: NamedTempFile,
    cancel_requested: bool,
}

impl Worker {
    fn matches(&self, target: &TerminateTarget) -> bool {
        match target {
            TerminateTarget::Job(id) => &self.job_id == id,
            TerminateTarget::Pid(pid) => self.pid == *pid,
        }
    }
}

enum Slot {
    Idle,
    Supervising(Box<Worker>),
}

/// Cloneable control surface of a running launcher.
#[derive(Clone)]
pub struct LauncherHandle {
    commands: mpsc::Sender<Command>,
    counters: Arc<Counters>,
    slots: usize,
    stop: CancellationToken,
}

impl LauncherHandle {
    /// Kill the worker addressed by `target`. Returns the job id when a live
    /// worker matched. The job is recorded as cancelled on the next reap.
    pub async fn terminate(&self, target: TerminateTarget) -> CoreResult<Option<JobId>> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Terminate { target, reply })
            .await
            .map_err(|_| CoreError::Launch("launcher stopped".into()))?;
        rx.await.map_err(|_| CoreError::Launch("launcher stopped".into()))
    }

    /// Stop the control loop and wait until it has applied `mode`.
    pub async fn shutdown(&self, mode: ShutdownMode) -> CoreResult<()> {
        let (reply, rx) = oneshot::channel();
        if self
            .commands
            .send(Command::Shutdown { mode, reply })
            .await
            .is_err()
        {
            // Loop already gone.
            return Ok(());
        }
        rx.await.map_err(|_| CoreError::Launch("launcher stopped".into()))
    }

    /// Current counters.
    pub fn stats(&self) -> LauncherStats {
        LauncherStats {
            slots: self.slots,
            active: self.counters.active.load(Ordering::Relaxed),
            started: self.counters.started.load(Ordering::Relaxed),
            completed: self.counters.completed.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            launch_failures: self.counters.launch_failures.load(Ordering::Relaxed),
        }
    }

    /// Token that detaches the loop when cancelled.
    pub fn stop_token(&self) -> CancellationToken {
        self.stop.clone()
    }
}

/// The control loop state. Owned by its tokio task.
pub struct Launcher {
    config: LauncherConfig,
    tracker: Arc<JobTracker>,
    artifacts: Arc<dyn ArtifactStore>,
    slots: Vec<Slot>,
    last_project: Option<String>,
    counters: Arc<Counters>,
    events: Arc<dyn JobEventSink>,
}

impl Launcher {
    /// Spawn the control loop on the current tokio runtime. Start, exit and
    /// launch-failure events go to `events`.
    pub fn spawn(
        config: LauncherConfig,
        tracker: Arc<JobTracker>,
        artifacts: Arc<dyn ArtifactStore>,
        events: Arc<dyn JobEventSink>,
    ) -> (LauncherHandle, JoinHandle<()>) {
        let slots = config.max_concurrent_jobs.max(1);
        let counters = Arc::new(Counters::default());
        let (tx, rx) = mpsc::channel(32);
        let stop = CancellationToken::new();
        let launcher = Self {
            slots: (0..slots).map(|_| Slot::Idle).collect(),
            config,
            tracker,
            artifacts,
            last_project: None,
            counters: Arc::clone(&counters),
            events,
        };
        let handle = LauncherHandle {
            commands: tx,
            counters,
            slots,
            stop: stop.clone(),
        };
        info!(slots, "launcher starting");
        let task = tokio::spawn(launcher.run(rx, stop));
        (handle, task)
    }

    async fn run(mut self, mut commands: mpsc::Receiver<Command>, stop: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                () = stop.cancelled() => {
                    self.detach();
                    break;
                }
                cmd = commands.recv() => match cmd {
                    Some(Command::Terminate { target, reply }) => {
                        let _ = reply.send(self.terminate(&target));
                    }
                    Some(Command::Shutdown { mode, reply }) => {
                        match mode {
                            ShutdownMode::Detach => self.detach(),
                            ShutdownMode::Terminate { grace } => self.terminate_all(grace).await,
                        }
                        let _ = reply.send(());
                        break;
                    }
                    None => {
                        self.detach();
                        break;
                    }
                },
                _ = ticker.tick() => self.tick().await,
            }
        }
        info!("launcher stopped");
    }

    async fn tick(&mut self) {
        self.reap();
        self.fill_slots().await;
    }

    fn reap(&mut self) {
        let mut exited = Vec::new();
        for slot in &mut self.slots {
            let Slot::Supervising(worker) = slot else {
                continue;
            };
            let status = match worker.child.try_wait() {
                Ok(None) => continue,
                Ok(Some(status)) => Ok(status),
                Err(e) => Err(e),
            };
            if let Slot::Supervising(worker) = std::mem::replace(slot, Slot::Idle) {
                exited.push((worker, status));
            }
        }
        for (worker, status) in exited {
            self.record_exit(*worker, status);
        }
    }

    fn record_exit(&self, worker: Worker, status: io::Result<ExitStatus>) {
        let outcome = match status {
            Ok(status) if worker.cancel_requested && status.success() => {
                // Finished cleanly before the kill landed.
                JobOutcome::Success
            }
            _ if worker.cancel_requested => JobOutcome::Cancelled,
            Ok(status) => JobOutcome::from_exit_status(status),
            Err(e) => {
                error!(job_id = %worker.job_id, error = %e, "failed to poll worker");
                JobOutcome::Signaled { signal: None }
            }
        };
        self.counters.active.fetch_sub(1, Ordering::Relaxed);
        if outcome.is_success() {
            self.counters.completed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.counters.failed.fetch_add(1, Ordering::Relaxed);
        }
        info!(
            job_id = %worker.job_id,
            project = %worker.project,
            spider = %worker.spider,
            pid = worker.pid,
            outcome = ?outcome,
            "job finished"
        );
        let kind = if outcome == JobOutcome::Cancelled {
            JobEventKind::Cancelled
        } else {
            JobEventKind::Completed {
                outcome: outcome.clone(),
            }
        };
        if let Err(e) = self.tracker.mark_finished(&worker.job_id, outcome) {
            error!(job_id = %worker.job_id, error = %e, "could not record job exit");
        }
        self.events
            .record(JobEvent::new(&worker.job_id, &worker.project, &worker.spider, kind));
    }

    async fn fill_slots(&mut self) {
        while let Some(index) = self.slots.iter().position(|s| matches!(s, Slot::Idle)) {
            let Some(record) = self.claim_round_robin() else {
                return;
            };
            let prepared = prepare_artifact(
                Arc::clone(&self.artifacts),
                self.config.work_dir.clone(),
                &record.request,
            )
            .await;
            match prepared.and_then(|(artifact, file)| self.start(index, &record, &artifact, file)) {
                Ok(worker) => {
                    self.counters.started.fetch_add(1, Ordering::Relaxed);
                    self.counters.active.fetch_add(1, Ordering::Relaxed);
                    self.slots[index] = Slot::Supervising(Box::new(worker));
                }
                Err(e) => {
                    warn!(job_id = %record.id(), project = %record.project(), error = %e, "launch failed");
                    self.counters.launch_failures.fetch_add(1, Ordering::Relaxed);
                    let reason = e.to_string();
                    if let Err(e) = self.tracker.fail_launch(record.id(), reason.clone()) {
                        error!(job_id = %record.id(), error = %e, "could not record launch failure");
                    }
                    self.events
                        .record(JobEvent::for_record(&record, JobEventKind::LaunchFailed { reason }));
                }
            }
        }
    }

    /// Claim from the first non-empty project after the last one served.
    fn claim_round_robin(&mut self) -> Option<JobRecord> {
        let projects: Vec<String> = self.tracker.projects_with_pending().into_iter().collect();
        let start = self
            .last_project
            .as_ref()
            .map_or(0, |last| projects.partition_point(|p| p <= last));
        let (after, before) = projects.split_at(start.min(projects.len()));
        for project in after.iter().chain(before) {
            match self.tracker.claim_next(project) {
                Ok(Some(record)) => {
                    self.last_project = Some(project.clone());
                    return Some(record);
                }
                Ok(None) => {}
                Err(e) => error!(project = %project, error = %e, "failed to claim from queue"),
            }
        }
        None
    }

    fn start(
        &self,
        slot: usize,
        record: &JobRecord,
        artifact: &Artifact,
        artifact_file: NamedTempFile,
    ) -> CoreResult<Worker> {
        let request = &record.request;

        let log_path = validate::job_file(
            &self.config.logs_dir,
            &request.project,
            &request.spider,
            &request.job_id,
            "log",
        )?;
        let log = create_with_parent(&log_path)?;
        let log_err = log
            .try_clone()
            .map_err(|e| CoreError::storage(log_path.display(), e))?;

        let mut cmd = worker_command(&self.config.runner, artifact, artifact_file.path());
        cmd.args(crawl_args(&request.spider, &request.settings, &request.args))
            .env(runner::ENV_JOB, &request.job_id)
            .env(runner::ENV_SLOT, slot.to_string())
            .env(runner::ENV_LOG_FILE, &log_path)
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err));
        if let Some(items_dir) = &self.config.items_dir {
            let items_path =
                validate::job_file(items_dir, &request.project, &request.spider, &request.job_id, "jl")?;
            if let Some(parent) = items_path.parent() {
                fs::create_dir_all(parent).map_err(|e| CoreError::storage(parent.display(), e))?;
            }
            cmd.env(runner::ENV_ITEMS_FILE, &items_path);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| CoreError::Launch(format!("{}: {e}", self.config.runner.program)))?;
        let pid = child.id().unwrap_or_default();
        if let Err(e) = self
            .tracker
            .mark_running_with_version(&request.job_id, pid, Some(artifact.version.clone()))
        {
            let _ = child.start_kill();
            return Err(e);
        }
        info!(
            job_id = %request.job_id,
            project = %request.project,
            spider = %request.spider,
            version = %artifact.version,
            pid,
            slot,
            "job started"
        );
        self.events.record(JobEvent::for_record(
            record,
            JobEventKind::Started {
                pid,
                version: artifact.version.clone(),
            },
        ));
        Ok(Worker {
            job_id: request.job_id.clone(),
            project: request.project.clone(),
            spider: request.spider.clone(),
            pid,
            child,
            _artifact: artifact_file,
            cancel_requested: false,
        })
    }

    fn terminate(&mut self, target: &TerminateTarget) -> Option<JobId> {
        let index = self
            .slots
            .iter()
            .position(|slot| matches!(slot, Slot::Supervising(w) if w.matches(target)))?;
        if let Some(status) = self.exited_status(index) {
            // Exited between ticks: record the real status, nothing to kill.
            if let Slot::Supervising(worker) = std::mem::replace(&mut self.slots[index], Slot::Idle) {
                debug!(job_id = %worker.job_id, "terminate found worker already exited");
                self.record_exit(*worker, Ok(status));
            }
            return None;
        }
        let Slot::Supervising(worker) = &mut self.slots[index] else {
            return None;
        };
        if let Err(e) = worker.child.start_kill() {
            // Already exited; the next reap records the real status.
            debug!(job_id = %worker.job_id, error = %e, "kill failed");
            return None;
        }
        worker.cancel_requested = true;
        info!(job_id = %worker.job_id, pid = worker.pid, "termination requested");
        Some(worker.job_id.clone())
    }

    fn exited_status(&mut self, index: usize) -> Option<ExitStatus> {
        let Slot::Supervising(worker) = &mut self.slots[index] else {
            return None;
        };
        match worker.child.try_wait() {
            Ok(status) => status,
            Err(e) => {
                debug!(job_id = %worker.job_id, error = %e, "try_wait failed");
                None
            }
        }
    }

    fn detach(&mut self) {
        let live = self
            .slots
            .iter()
            .filter(|s| matches!(s, Slot::Supervising(_)))
            .count();
        info!(live, "detaching from running workers");
        for slot in &mut self.slots {
            if let Slot::Supervising(worker) = std::mem::replace(slot, Slot::Idle) {
                // The child handle is dropped without kill; the materialized
                // artifact must outlive the worker.
                let Worker {
                    _artifact: artifact,
                    ..
                } = *worker;
                if let Err(e) = artifact.keep() {
                    warn!(error = %e, "could not keep artifact for detached worker");
                }
            }
        }
    }

    async fn terminate_all(&mut self, grace: Duration) {
        let mut workers = Vec::new();
        for slot in &mut self.slots {
            if let Slot::Supervising(mut worker) = std::mem::replace(slot, Slot::Idle) {
                if let Ok(Some(status)) = worker.child.try_wait() {
                    workers.push((worker, Some(status)));
                    continue;
                }
                if let Err(e) = worker.child.start_kill() {
                    debug!(job_id = %worker.job_id, error = %e, "kill failed");
                }
                worker.cancel_requested = true;
                workers.push((worker, None));
            }
        }
        info!(count = workers.len(), "terminating workers");
        for (mut worker, exited) in workers {
            let status = match exited {
                Some(status) => Ok(status),
                None => match tokio::time::timeout(grace, worker.child.wait()).await {
                    Ok(status) => status,
                    Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "worker not reaped in time")),
                },
            };
            self.record_exit(*worker, status);
        }
    }
}

/// Fetch and materialize the artifact off the control loop; both touch disk.
async fn prepare_artifact(
    artifacts: Arc<dyn ArtifactStore>,
    work_dir: PathBuf,
    request: &JobRequest,
) -> CoreResult<(Artifact, NamedTempFile)> {
    let project = request.project.clone();
    let version = request.version.clone();
    tokio::task::spawn_blocking(move || -> CoreResult<(Artifact, NamedTempFile)> {
        let artifact = artifacts.get(&project, version.as_deref())?;
        let file = materialize(&work_dir, &artifact)?;
        Ok((artifact, file))
    })
    .await
    .map_err(|e| CoreError::Launch(format!("artifact preparation aborted: {e}")))?
}

fn create_with_parent(path: &Path) -> CoreResult<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| CoreError::storage(parent.display(), e))?;
    }
    File::create(path).map_err(|e| CoreError::storage(path.display(), e))
}

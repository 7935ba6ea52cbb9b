//! API-facing response models.
//!
//! The HTTP layer lives outside this crate; these types give it a stable
//! JSON shape for job listings and daemon status.

use serde::{Deserialize, Serialize};

use crate::core::{JobOutcome, JobRecord, JobSnapshot, LauncherStats};

/// Relative URL of a job's log file.
pub fn job_log_url(project: &str, spider: &str, job_id: &str) -> String {
    format!("/logs/{project}/{spider}/{job_id}.log")
}

/// Relative URL of a job's items file.
pub fn job_items_url(project: &str, spider: &str, job_id: &str) -> String {
    format!("/items/{project}/{spider}/{job_id}.jl")
}

/// One job in a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSummary {
    /// Job id.
    pub id: String,
    /// Project.
    pub project: String,
    /// Spider.
    pub spider: String,
    /// Version launched, or the pinned one while pending.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Worker pid while running.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    /// Start time in ms since epoch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time_ms: Option<u64>,
    /// End time in ms since epoch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time_ms: Option<u64>,
    /// How the job ended.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<JobOutcome>,
    /// Log URL once the job has started.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_url: Option<String>,
    /// Items URL once the job has started, when items are collected.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items_url: Option<String>,
}

impl JobSummary {
    /// Summary of `record`; `items` says whether items files are written.
    pub fn from_record(record: &JobRecord, items: bool) -> Self {
        let started = record.start_time_ms.is_some();
        let log_url = started.then(|| job_log_url(record.project(), record.spider(), record.id()));
        let items_url =
            (started && items).then(|| job_items_url(record.project(), record.spider(), record.id()));
        Self {
            id: record.id().to_owned(),
            project: record.project().to_owned(),
            spider: record.spider().to_owned(),
            version: record
                .launched_version
                .clone()
                .or_else(|| record.request.version.clone()),
            pid: record.pid,
            start_time_ms: record.start_time_ms,
            end_time_ms: record.end_time_ms,
            outcome: record.outcome.clone(),
            log_url,
            items_url,
        }
    }
}

/// Jobs grouped by state, optionally filtered to one project.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobListing {
    /// Pending jobs.
    pub pending: Vec<JobSummary>,
    /// Running jobs.
    pub running: Vec<JobSummary>,
    /// Finished jobs, newest first.
    pub finished: Vec<JobSummary>,
}

/// Build a listing from a tracker snapshot.
pub fn list_jobs(snapshot: &JobSnapshot, project: Option<&str>, items: bool) -> JobListing {
    let pick = |jobs: &[JobRecord]| {
        jobs.iter()
            .filter(|j| project.is_none_or(|p| j.project() == p))
            .map(|j| JobSummary::from_record(j, items))
            .collect()
    };
    JobListing {
        pending: pick(&snapshot.pending),
        running: pick(&snapshot.running),
        finished: pick(&snapshot.finished),
    }
}

/// Daemon status counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonStatus {
    /// Pending jobs.
    pub pending: usize,
    /// Running jobs.
    pub running: usize,
    /// Retained finished jobs.
    pub finished: usize,
    /// Worker slots.
    pub slots: usize,
}

/// Status from a snapshot and the launcher counters.
pub fn daemon_status(snapshot: &JobSnapshot, stats: &LauncherStats) -> DaemonStatus {
    DaemonStatus {
        pending: snapshot.pending.len(),
        running: snapshot.running.len(),
        finished: snapshot.finished.len(),
        slots: stats.slots,
    }
}

/// Health response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Health {
    /// Healthy flag.
    pub ok: bool,
}

/// Return a health payload.
pub const fn health() -> Health {
    Health { ok: true }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{JobRequest, JobState};

    fn record(project: &str, started: bool) -> JobRecord {
        let mut r = JobRecord::pending(JobRequest {
            job_id: "j1".into(),
            project: project.into(),
            spider: "s1".into(),
            version: None,
            settings: Default::default(),
            args: Default::default(),
            created_at_ms: 0,
        });
        if started {
            r.state = JobState::Running;
            r.start_time_ms = Some(10);
            r.pid = Some(99);
            r.launched_version = Some("r2".into());
        }
        r
    }

    #[test]
    fn test_urls_only_after_start() {
        let pending = JobSummary::from_record(&record("p", false), true);
        assert!(pending.log_url.is_none());
        let running = JobSummary::from_record(&record("p", true), true);
        assert_eq!(running.log_url.as_deref(), Some("/logs/p/s1/j1.log"));
        assert_eq!(running.items_url.as_deref(), Some("/items/p/s1/j1.jl"));
        assert_eq!(running.version.as_deref(), Some("r2"));
    }

    #[test]
    fn test_listing_filters_by_project() {
        let snapshot = JobSnapshot {
            pending: vec![record("a", false), record("b", false)],
            running: vec![record("a", true)],
            finished: Vec::new(),
        };
        let listing = list_jobs(&snapshot, Some("a"), false);
        assert_eq!(listing.pending.len(), 1);
        assert_eq!(listing.running.len(), 1);
        assert!(listing.running[0].items_url.is_none());
        assert_eq!(list_jobs(&snapshot, None, false).pending.len(), 2);
    }
}

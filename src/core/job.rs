//! Job requests, records and outcomes.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque job identifier.
pub type JobId = String;

/// Generate a fresh job id (uuid v4, simple hex form).
pub fn new_job_id() -> JobId {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Lifecycle state of a job. Transitions only go forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Queued, or claimed by the launcher but not yet started.
    Pending,
    /// Worker process is alive.
    Running,
    /// Worker process exited, was killed, or never started.
    Finished,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Finished => write!(f, "finished"),
        }
    }
}

/// How a finished job ended. Only [`JobOutcome::Success`] counts as success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum JobOutcome {
    /// Exit code 0.
    Success,
    /// Non-zero exit code.
    Failed {
        /// Process exit code.
        exit_code: i32,
    },
    /// Killed by a signal the service did not send.
    Signaled {
        /// Signal number when the platform reports one.
        signal: Option<i32>,
    },
    /// Terminated on request (cancel or shutdown).
    Cancelled,
    /// Worker process never started.
    LaunchFailed {
        /// Why the launch failed.
        reason: String,
    },
}

impl JobOutcome {
    /// True only for a clean exit.
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Map a process exit status to an outcome.
    pub fn from_exit_status(status: std::process::ExitStatus) -> Self {
        if status.success() {
            return Self::Success;
        }
        match status.code() {
            Some(exit_code) => Self::Failed { exit_code },
            None => Self::Signaled {
                signal: exit_signal(status),
            },
        }
    }
}

#[cfg(unix)]
fn exit_signal(status: std::process::ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: std::process::ExitStatus) -> Option<i32> {
    None
}

/// A queued crawl request. This is what the project queues persist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRequest {
    /// Unique job id.
    pub job_id: JobId,
    /// Project the spider belongs to.
    pub project: String,
    /// Spider to run.
    pub spider: String,
    /// Pinned artifact version; `None` runs the highest version at launch.
    #[serde(default)]
    pub version: Option<String>,
    /// Crawler settings overrides, passed as `-s KEY=VALUE`.
    #[serde(default)]
    pub settings: BTreeMap<String, String>,
    /// Spider arguments, passed as `-a key=value`.
    #[serde(default)]
    pub args: BTreeMap<String, String>,
    /// Submission time in milliseconds since epoch.
    pub created_at_ms: u64,
}

/// Full mutable record of one job as seen by the tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    /// The originating request.
    #[serde(flatten)]
    pub request: JobRequest,
    /// Current state.
    pub state: JobState,
    /// Artifact version actually launched.
    pub launched_version: Option<String>,
    /// Worker pid while running.
    pub pid: Option<u32>,
    /// Start time in milliseconds since epoch.
    pub start_time_ms: Option<u64>,
    /// End time in milliseconds since epoch.
    pub end_time_ms: Option<u64>,
    /// Exit outcome once finished.
    pub outcome: Option<JobOutcome>,
}

impl JobRecord {
    /// New pending record for a request.
    pub const fn pending(request: JobRequest) -> Self {
        Self {
            request,
            state: JobState::Pending,
            launched_version: None,
            pid: None,
            start_time_ms: None,
            end_time_ms: None,
            outcome: None,
        }
    }

    /// Job id shortcut.
    pub fn id(&self) -> &str {
        &self.request.job_id
    }

    /// Project shortcut.
    pub fn project(&self) -> &str {
        &self.request.project
    }

    /// Spider shortcut.
    pub fn spider(&self) -> &str {
        &self.request.spider
    }
}

/// Consistent view of every tracked job, grouped by state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobSnapshot {
    /// Queued and claimed jobs, per project in FIFO order.
    pub pending: Vec<JobRecord>,
    /// Jobs with a live worker process.
    pub running: Vec<JobRecord>,
    /// Retained finished jobs, newest end time first.
    pub finished: Vec<JobRecord>,
}

impl JobSnapshot {
    /// State the job is in, if it appears in the snapshot.
    pub fn state_of(&self, job_id: &str) -> Option<JobState> {
        [
            (&self.pending, JobState::Pending),
            (&self.running, JobState::Running),
            (&self.finished, JobState::Finished),
        ]
        .into_iter()
        .find(|(jobs, _)| jobs.iter().any(|j| j.id() == job_id))
        .map(|(_, state)| state)
    }

    /// Total number of jobs in the snapshot.
    pub fn len(&self) -> usize {
        self.pending.len() + self.running.len() + self.finished.len()
    }

    /// True when nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_ids_are_unique_hex() {
        let a = new_job_id();
        let b = new_job_id();
        assert_ne!(a, b);
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn request_round_trips_through_json_with_defaults() {
        let line = r#"{"job_id":"j1","project":"p","spider":"s","created_at_ms":5}"#;
        let req: JobRequest = serde_json::from_str(line).unwrap();
        assert_eq!(req.version, None);
        assert!(req.settings.is_empty());
        assert!(req.args.is_empty());
    }

    #[test]
    fn outcome_serializes_tagged() {
        let json = serde_json::to_string(&JobOutcome::Failed { exit_code: 3 }).unwrap();
        assert_eq!(json, r#"{"kind":"failed","exit_code":3}"#);
        assert!(!JobOutcome::Cancelled.is_success());
        assert!(JobOutcome::Success.is_success());
    }
}

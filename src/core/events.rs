//! Job lifecycle events.
//!
//! The scheduler and launcher report every transition a hook would care about
//! (scheduled, started, completed, cancelled, launch failed) to a
//! [`JobEventSink`]. Sinks are called synchronously from the control loop and
//! must not block.

use std::collections::VecDeque;

use parking_lot::Mutex;
use serde::Serialize;

use super::job::{JobId, JobOutcome, JobRecord};
use crate::util::clock::now_ms;

/// What happened to the job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JobEventKind {
    /// Accepted into its project queue.
    Scheduled,
    /// Worker spawned.
    Started {
        /// Worker process id.
        pid: u32,
        /// Artifact version the worker runs.
        version: String,
    },
    /// Worker exited on its own.
    Completed {
        /// Exit classification.
        outcome: JobOutcome,
    },
    /// Removed from the queue or killed on request.
    Cancelled,
    /// Claimed but no worker could be started.
    LaunchFailed {
        /// Why the launch failed.
        reason: String,
    },
}

/// One lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobEvent {
    /// Job the event belongs to.
    pub job_id: JobId,
    /// Project name.
    pub project: String,
    /// Spider name.
    pub spider: String,
    /// Event details.
    #[serde(flatten)]
    pub kind: JobEventKind,
    /// Milliseconds since the Unix epoch.
    pub at_ms: u64,
}

impl JobEvent {
    /// Event for `record`, stamped now.
    pub fn for_record(record: &JobRecord, kind: JobEventKind) -> Self {
        Self::new(record.id(), record.project(), &record.request.spider, kind)
    }

    /// Event for an explicit job, stamped now.
    pub fn new(job_id: &str, project: &str, spider: &str, kind: JobEventKind) -> Self {
        Self {
            job_id: job_id.to_owned(),
            project: project.to_owned(),
            spider: spider.to_owned(),
            kind,
            at_ms: now_ms(),
        }
    }
}

/// Receiver of lifecycle events.
pub trait JobEventSink: Send + Sync {
    /// Record one event.
    fn record(&self, event: JobEvent);
}

/// Writes each event to the tracing log at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl JobEventSink for TracingEventSink {
    fn record(&self, event: JobEvent) {
        tracing::debug!(
            job_id = %event.job_id,
            project = %event.project,
            spider = %event.spider,
            kind = ?event.kind,
            "job event"
        );
    }
}

/// Bounded in-memory event history, oldest dropped first.
pub struct InMemoryEventSink {
    events: Mutex<VecDeque<JobEvent>>,
    max_events: usize,
}

impl InMemoryEventSink {
    /// Sink keeping at most `max_events` events.
    pub fn new(max_events: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(max_events.min(1024))),
            max_events: max_events.max(1),
        }
    }

    /// Stored events, oldest first.
    pub fn events(&self) -> Vec<JobEvent> {
        self.events.lock().iter().cloned().collect()
    }

    /// Stored events for one job.
    pub fn events_for(&self, job_id: &str) -> Vec<JobEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.job_id == job_id)
            .cloned()
            .collect()
    }
}

impl JobEventSink for InMemoryEventSink {
    fn record(&self, event: JobEvent) {
        let mut events = self.events.lock();
        if events.len() >= self.max_events {
            events.pop_front();
        }
        events.push_back(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_sink_is_bounded() {
        let sink = InMemoryEventSink::new(2);
        for id in ["j1", "j2", "j3"] {
            sink.record(JobEvent::new(id, "p", "s", JobEventKind::Scheduled));
        }
        let ids: Vec<_> = sink.events().into_iter().map(|e| e.job_id).collect();
        assert_eq!(ids, vec!["j2", "j3"]);
        assert_eq!(sink.events_for("j3").len(), 1);
        assert!(sink.events_for("j1").is_empty());
    }

    #[test]
    fn test_event_serializes_flat() {
        let event = JobEvent::new(
            "j1",
            "p",
            "s",
            JobEventKind::Started {
                pid: 7,
                version: "r1".into(),
            },
        );
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "started");
        assert_eq!(value["pid"], 7);
        assert_eq!(value["version"], "r1");
        assert_eq!(value["job_id"], "j1");
    }
}

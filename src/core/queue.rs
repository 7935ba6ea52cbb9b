//! Per-project pending queue abstraction.

use super::error::CoreResult;
use super::job::JobRequest;

/// FIFO of pending requests for one project.
///
/// Implementations are not internally synchronized; the tracker wraps each
/// queue in its own mutex so that a popped request is handed out once.
pub trait ProjectQueue: Send {
    /// Append a request at the tail.
    fn push(&mut self, request: JobRequest) -> CoreResult<()>;
    /// Remove and return the head. The removal is durable before the request
    /// is returned.
    fn pop(&mut self) -> CoreResult<Option<JobRequest>>;
    /// Remove a specific request by job id.
    fn remove(&mut self, job_id: &str) -> CoreResult<Option<JobRequest>>;
    /// Pending requests in FIFO order.
    fn list(&self) -> Vec<JobRequest>;
    /// Drop every pending request and return how many were removed.
    fn clear(&mut self) -> CoreResult<usize>;
    /// Current depth.
    fn len(&self) -> usize;
    /// True when nothing is pending.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Opens project queues and discovers the ones that already exist.
pub trait QueueFactory: Send + Sync {
    /// Open (or create) the queue for a validated project name.
    fn open(&self, project: &str) -> CoreResult<Box<dyn ProjectQueue>>;
    /// Projects with persisted queues, used to resume after a restart.
    fn existing_projects(&self) -> CoreResult<Vec<String>>;
}

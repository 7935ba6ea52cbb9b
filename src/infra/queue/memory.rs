//! In-memory project queue.

use std::collections::VecDeque;

use crate::core::{CoreResult, JobRequest, ProjectQueue, QueueFactory};

/// Volatile FIFO. Pending jobs do not survive a restart.
#[derive(Debug, Default)]
pub struct InMemoryQueue {
    requests: VecDeque<JobRequest>,
}

impl InMemoryQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProjectQueue for InMemoryQueue {
    fn push(&mut self, request: JobRequest) -> CoreResult<()> {
        self.requests.push_back(request);
        Ok(())
    }

    fn pop(&mut self) -> CoreResult<Option<JobRequest>> {
        Ok(self.requests.pop_front())
    }

    fn remove(&mut self, job_id: &str) -> CoreResult<Option<JobRequest>> {
        let position = self.requests.iter().position(|r| r.job_id == job_id);
        Ok(position.and_then(|i| self.requests.remove(i)))
    }

    fn list(&self) -> Vec<JobRequest> {
        self.requests.iter().cloned().collect()
    }

    fn clear(&mut self) -> CoreResult<usize> {
        let removed = self.requests.len();
        self.requests.clear();
        Ok(removed)
    }

    fn len(&self) -> usize {
        self.requests.len()
    }
}

/// Factory for [`InMemoryQueue`]s. Knows no projects at startup.
#[derive(Debug, Default, Clone, Copy)]
pub struct InMemoryQueueFactory;

impl QueueFactory for InMemoryQueueFactory {
    fn open(&self, _project: &str) -> CoreResult<Box<dyn ProjectQueue>> {
        Ok(Box::new(InMemoryQueue::new()))
    }

    fn existing_projects(&self) -> CoreResult<Vec<String>> {
        Ok(Vec::new())
    }
}

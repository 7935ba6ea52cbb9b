//! File-backed project queue.
//!
//! One JSON-lines file per project under the queue directory. Pushes append a
//! line; pops and removals rewrite the file (temp file + rename) before the
//! in-memory copy changes, so a request handed to the launcher is already
//! gone from disk and a hard restart cannot resurrect it.

use std::collections::VecDeque;
use std::fs::{create_dir_all, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::core::validate;
use crate::core::{CoreError, CoreResult, JobRequest, ProjectQueue, QueueFactory};

const EXTENSION: &str = "jsonl";

/// Durable FIFO persisted as JSON lines.
pub struct JsonlQueue {
    path: PathBuf,
    requests: VecDeque<JobRequest>,
}

impl JsonlQueue {
    /// Open the queue file for `project` inside `dir`, loading any requests
    /// left over from a previous run.
    pub fn open(dir: impl AsRef<Path>, project: &str) -> CoreResult<Self> {
        let dir = dir.as_ref();
        let project = validate::project(project)?;
        create_dir_all(dir).map_err(|e| CoreError::storage(dir.display(), e))?;
        let mut queue = Self {
            path: dir.join(format!("{project}.{EXTENSION}")),
            requests: VecDeque::new(),
        };
        queue.load_from_disk()?;
        Ok(queue)
    }

    /// Backing file location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load_from_disk(&mut self) -> CoreResult<()> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(CoreError::storage(self.path.display(), e)),
        };
        let mut skipped = false;
        for (number, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<JobRequest>(line) {
                Ok(request) => self.requests.push_back(request),
                Err(e) => {
                    // A torn final line from a crash mid-append is skipped.
                    tracing::warn!(
                        path = %self.path.display(),
                        line = number + 1,
                        error = %e,
                        "skipping unreadable queue entry"
                    );
                    skipped = true;
                }
            }
        }
        // Later appends must start on a fresh line.
        if skipped || !(contents.is_empty() || contents.ends_with('\n')) {
            self.rewrite_disk(self.requests.iter())?;
        }
        Ok(())
    }

    fn append_to_disk(&self, request: &JobRequest) -> CoreResult<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| CoreError::storage(self.path.display(), e))?;
        let line = serde_json::to_string(request).map_err(|e| CoreError::storage("encode request", e))?;
        writeln!(file, "{line}").map_err(|e| CoreError::storage(self.path.display(), e))
    }

    fn rewrite_disk<'a>(&self, requests: impl Iterator<Item = &'a JobRequest>) -> CoreResult<()> {
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        let tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| CoreError::storage(dir.display(), e))?;
        {
            let mut writer = BufWriter::new(tmp.as_file());
            for request in requests {
                let line =
                    serde_json::to_string(request).map_err(|e| CoreError::storage("encode request", e))?;
                writeln!(writer, "{line}").map_err(|e| CoreError::storage(self.path.display(), e))?;
            }
            writer.flush().map_err(|e| CoreError::storage(self.path.display(), e))?;
        }
        tmp.persist(&self.path)
            .map_err(|e| CoreError::storage(self.path.display(), e.error))?;
        Ok(())
    }
}

impl ProjectQueue for JsonlQueue {
    fn push(&mut self, request: JobRequest) -> CoreResult<()> {
        self.append_to_disk(&request)?;
        self.requests.push_back(request);
        Ok(())
    }

    fn pop(&mut self) -> CoreResult<Option<JobRequest>> {
        if self.requests.is_empty() {
            return Ok(None);
        }
        self.rewrite_disk(self.requests.iter().skip(1))?;
        Ok(self.requests.pop_front())
    }

    fn remove(&mut self, job_id: &str) -> CoreResult<Option<JobRequest>> {
        let Some(index) = self.requests.iter().position(|r| r.job_id == job_id) else {
            return Ok(None);
        };
        self.rewrite_disk(
            self.requests
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != index)
                .map(|(_, r)| r),
        )?;
        Ok(self.requests.remove(index))
    }

    fn list(&self) -> Vec<JobRequest> {
        self.requests.iter().cloned().collect()
    }

    fn clear(&mut self) -> CoreResult<usize> {
        self.rewrite_disk(std::iter::empty())?;
        let removed = self.requests.len();
        self.requests.clear();
        Ok(removed)
    }

    fn len(&self) -> usize {
        self.requests.len()
    }
}

/// Factory for [`JsonlQueue`]s rooted at one directory.
#[derive(Debug, Clone)]
pub struct JsonlQueueFactory {
    dir: PathBuf,
}

impl JsonlQueueFactory {
    /// Queues will live in `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl QueueFactory for JsonlQueueFactory {
    fn open(&self, project: &str) -> CoreResult<Box<dyn ProjectQueue>> {
        Ok(Box::new(JsonlQueue::open(&self.dir, project)?))
    }

    fn existing_projects(&self) -> CoreResult<Vec<String>> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(CoreError::storage(self.dir.display(), e)),
        };
        let mut projects = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| CoreError::storage(self.dir.display(), e))?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if validate::project(stem).is_ok() {
                projects.push(stem.to_owned());
            }
        }
        projects.sort();
        Ok(projects)
    }
}

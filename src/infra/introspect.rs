//! Spider introspection through a short-lived runner subprocess.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinHandle;

use crate::config::RunnerConfig;
use crate::core::runner::{list_args, materialize, worker_command};
use crate::core::{validate, ArtifactStore, CoreError, CoreResult, SpiderIntrospector};

/// Runs `<runner> list -s LOG_STDOUT=0` against a materialized artifact.
pub struct ProcessIntrospector {
    artifacts: Arc<dyn ArtifactStore>,
    runner: RunnerConfig,
    work_dir: PathBuf,
    timeout: Duration,
}

impl ProcessIntrospector {
    /// New introspector.
    pub fn new(
        artifacts: Arc<dyn ArtifactStore>,
        runner: RunnerConfig,
        work_dir: impl Into<PathBuf>,
        timeout: Duration,
    ) -> Self {
        Self {
            artifacts,
            runner,
            work_dir: work_dir.into(),
            timeout,
        }
    }
}

/// Spider names from the last stdout line that is a JSON array of strings,
/// sorted and deduplicated.
pub fn parse_spider_list(stdout: &str) -> Option<Vec<String>> {
    let mut spiders = stdout
        .lines()
        .rev()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .find_map(|l| serde_json::from_str::<Vec<String>>(l).ok())?;
    spiders.sort();
    spiders.dedup();
    Some(spiders)
}

/// Output collected so far from one pipe of the child.
type Captured = Arc<Mutex<Vec<u8>>>;

/// Drain `pipe` into a shared buffer until EOF, so partial output survives a
/// timeout.
fn capture<R>(pipe: Option<R>) -> (Captured, Option<JoinHandle<()>>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let buf = Captured::default();
    let task = pipe.map(|mut pipe| {
        let buf = Arc::clone(&buf);
        tokio::spawn(async move {
            let mut chunk = [0_u8; 4096];
            loop {
                match pipe.read(&mut chunk).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => buf.lock().extend_from_slice(&chunk[..n]),
                }
            }
        })
    });
    (buf, task)
}

fn captured_text(buf: &Captured) -> String {
    String::from_utf8_lossy(&buf.lock()).into_owned()
}

#[async_trait]
impl SpiderIntrospector for ProcessIntrospector {
    async fn list_spiders(&self, project: &str, version: Option<&str>) -> CoreResult<Vec<String>> {
        validate::project(project)?;
        let artifact = self.artifacts.get(project, version)?;
        let file = materialize(&self.work_dir, &artifact)?;

        let mut child = worker_command(&self.runner, &artifact, file.path())
            .args(list_args())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CoreError::Introspection {
                message: format!("could not start {}: {e}", self.runner.program),
                stdout: String::new(),
                stderr: String::new(),
            })?;
        let (stdout_buf, stdout_task) = capture(child.stdout.take());
        let (stderr_buf, stderr_task) = capture(child.stderr.take());

        let status = if let Ok(status) = tokio::time::timeout(self.timeout, child.wait()).await {
            status.map_err(|e| CoreError::storage("introspection wait", e))?
        } else {
            let _ = child.start_kill();
            let _ = child.wait().await;
            // Grandchildren may still hold the pipes open.
            for task in [stdout_task, stderr_task].into_iter().flatten() {
                task.abort();
            }
            tracing::warn!(project, timeout_secs = self.timeout.as_secs(), "introspection timed out");
            return Err(CoreError::Introspection {
                message: format!("timed out after {:?}", self.timeout),
                stdout: captured_text(&stdout_buf),
                stderr: captured_text(&stderr_buf),
            });
        };
        for task in [stdout_task, stderr_task].into_iter().flatten() {
            let _ = task.await;
        }
        drop(file);

        let stdout = captured_text(&stdout_buf);
        let stderr = captured_text(&stderr_buf);
        if !status.success() {
            tracing::warn!(project, status = %status, "introspection failed");
            return Err(CoreError::Introspection {
                message: format!("runner exited with {status}"),
                stdout,
                stderr,
            });
        }
        parse_spider_list(&stdout).ok_or_else(|| CoreError::Introspection {
            message: "no spider list in output".into(),
            stdout,
            stderr,
        })
    }
}

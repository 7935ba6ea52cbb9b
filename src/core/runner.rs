//! Worker process contract: argv, environment and artifact materialization.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use std::process::Stdio;

use tempfile::NamedTempFile;
use tokio::process::Command;

use super::artifact::Artifact;
use super::error::{CoreError, CoreResult};
use crate::config::RunnerConfig;

/// Env var naming the project.
pub const ENV_PROJECT: &str = "CRAWLD_PROJECT";
/// Env var naming the artifact version.
pub const ENV_VERSION: &str = "CRAWLD_VERSION";
/// Env var with the path of the materialized artifact.
pub const ENV_ARTIFACT: &str = "CRAWLD_ARTIFACT";
/// Env var with the job id.
pub const ENV_JOB: &str = "CRAWLD_JOB";
/// Env var with the launcher slot index.
pub const ENV_SLOT: &str = "CRAWLD_SLOT";
/// Env var with the job log path.
pub const ENV_LOG_FILE: &str = "CRAWLD_LOG_FILE";
/// Env var with the job items path.
pub const ENV_ITEMS_FILE: &str = "CRAWLD_ITEMS_FILE";

/// Subcommand arguments for a crawl: settings first, then spider arguments,
/// each in key order.
pub fn crawl_args(
    spider: &str,
    settings: &BTreeMap<String, String>,
    args: &BTreeMap<String, String>,
) -> Vec<String> {
    let mut argv = vec!["crawl".to_owned(), spider.to_owned()];
    for (k, v) in settings {
        argv.push("-s".to_owned());
        argv.push(format!("{k}={v}"));
    }
    for (k, v) in args {
        argv.push("-a".to_owned());
        argv.push(format!("{k}={v}"));
    }
    argv
}

/// Subcommand arguments for spider enumeration. The setting keeps project
/// logging off stdout so the last line stays parseable.
pub fn list_args() -> Vec<String> {
    vec!["list".into(), "-s".into(), "LOG_STDOUT=0".into()]
}

/// Write the artifact bytes to a private temp file under `work_dir`. The file
/// is removed when the returned handle drops.
pub fn materialize(work_dir: &Path, artifact: &Artifact) -> CoreResult<NamedTempFile> {
    std::fs::create_dir_all(work_dir).map_err(|e| CoreError::storage(work_dir.display(), e))?;
    let prefix = format!("{}-{}-", artifact.project, artifact.version);
    let mut file = tempfile::Builder::new()
        .prefix(&prefix)
        .suffix(".egg")
        .tempfile_in(work_dir)
        .map_err(|e| CoreError::storage(work_dir.display(), e))?;
    file.write_all(&artifact.data)
        .and_then(|()| file.flush())
        .map_err(|e| CoreError::storage(file.path().display(), e))?;
    Ok(file)
}

/// Base command for a project process with the runner's program, leading
/// args and environment, plus the project variables. Stdin is closed.
pub fn worker_command(runner: &RunnerConfig, artifact: &Artifact, artifact_path: &Path) -> Command {
    let mut cmd = Command::new(&runner.program);
    cmd.args(&runner.args)
        .envs(&runner.env)
        .env(ENV_PROJECT, &artifact.project)
        .env(ENV_VERSION, &artifact.version)
        .env(ENV_ARTIFACT, artifact_path)
        .stdin(Stdio::null());
    cmd
}

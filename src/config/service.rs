//! Service configuration structures.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::{Lexicographic, Natural, VersionOrder};

/// Queue backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueBackendConfig {
    /// In-memory queues, lost on restart.
    InMemory,
    /// JSON-lines files under `queues_dir`.
    #[default]
    File,
}

/// Version ordering used to pick a project's current version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionOrderConfig {
    /// Byte-wise string order.
    #[default]
    Lexicographic,
    /// Numeric-aware order.
    Natural,
}

impl VersionOrderConfig {
    /// Build the configured order.
    pub fn build(self) -> Arc<dyn VersionOrder> {
        match self {
            Self::Lexicographic => Arc::new(Lexicographic),
            Self::Natural => Arc::new(Natural),
        }
    }
}

/// Program used for worker and introspection processes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Executable.
    pub program: String,
    /// Arguments placed before the subcommand.
    #[serde(default)]
    pub args: Vec<String>,
    /// Extra environment for every spawned process.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            program: "scrapy-runner".into(),
            args: Vec::new(),
            env: BTreeMap::new(),
        }
    }
}

/// Root service configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Worker slots. 0 means `max_jobs_per_cpu` per CPU.
    pub max_concurrent_jobs: usize,
    /// Slots per CPU when `max_concurrent_jobs` is 0.
    pub max_jobs_per_cpu: usize,
    /// Launcher tick interval.
    pub poll_interval_ms: u64,
    /// Artifact store root.
    pub artifacts_dir: PathBuf,
    /// Job log root.
    pub logs_dir: PathBuf,
    /// Scraped items root; no items file when unset.
    pub items_dir: Option<PathBuf>,
    /// Queue files (file backend only).
    pub queues_dir: PathBuf,
    /// Scratch space for materialized artifacts.
    pub work_dir: PathBuf,
    /// Finished jobs retained in memory.
    pub finished_to_keep: usize,
    /// Wall-clock limit for spider introspection.
    pub introspection_timeout_secs: u64,
    /// Reject schedules for spiders missing from the project's spider list.
    pub verify_spiders: bool,
    /// Queue backend.
    pub queue: QueueBackendConfig,
    /// Version order.
    pub version_order: VersionOrderConfig,
    /// Worker program.
    pub runner: RunnerConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 0,
            max_jobs_per_cpu: 4,
            poll_interval_ms: 5_000,
            artifacts_dir: PathBuf::from("eggs"),
            logs_dir: PathBuf::from("logs"),
            items_dir: None,
            queues_dir: PathBuf::from("dbs"),
            work_dir: std::env::temp_dir().join("crawld"),
            finished_to_keep: 100,
            introspection_timeout_secs: 60,
            verify_spiders: true,
            queue: QueueBackendConfig::File,
            version_order: VersionOrderConfig::Lexicographic,
            runner: RunnerConfig::default(),
        }
    }
}

const ENV_PREFIX: &str = "CRAWLD_";

impl ServiceConfig {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_concurrent_jobs == 0 && self.max_jobs_per_cpu == 0 {
            return Err("max_jobs_per_cpu must be greater than 0 when max_concurrent_jobs is 0".into());
        }
        if self.poll_interval_ms == 0 {
            return Err("poll_interval_ms must be greater than 0".into());
        }
        if self.introspection_timeout_secs == 0 {
            return Err("introspection_timeout_secs must be greater than 0".into());
        }
        if self.runner.program.trim().is_empty() {
            return Err("runner.program must not be empty".into());
        }
        for (name, dir) in [
            ("artifacts_dir", &self.artifacts_dir),
            ("logs_dir", &self.logs_dir),
            ("queues_dir", &self.queues_dir),
            ("work_dir", &self.work_dir),
        ] {
            if dir.as_os_str().is_empty() {
                return Err(format!("{name} must not be empty"));
            }
        }
        Ok(())
    }

    /// Parse configuration from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Defaults overridden by `CRAWLD_*` variables, after loading `.env` if
    /// one exists.
    pub fn from_env() -> Result<Self, String> {
        let _ = dotenvy::dotenv();
        Self::from_vars(std::env::vars())
    }

    /// Defaults overridden by `CRAWLD_*` entries of `vars`.
    pub fn from_vars(vars: impl IntoIterator<Item = (String, String)>) -> Result<Self, String> {
        let mut cfg = Self::default();
        for (key, value) in vars {
            let Some(name) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            cfg.apply(name, &value)
                .map_err(|e| format!("{key}: {e}"))?;
        }
        cfg.validate()?;
        Ok(cfg)
    }

    fn apply(&mut self, name: &str, value: &str) -> Result<(), String> {
        fn num<T: std::str::FromStr>(value: &str) -> Result<T, String>
        where
            T::Err: std::fmt::Display,
        {
            value.trim().parse().map_err(|e| format!("invalid number {value:?}: {e}"))
        }

        match name {
            "MAX_CONCURRENT_JOBS" => self.max_concurrent_jobs = num(value)?,
            "MAX_JOBS_PER_CPU" => self.max_jobs_per_cpu = num(value)?,
            "POLL_INTERVAL_MS" => self.poll_interval_ms = num(value)?,
            "FINISHED_TO_KEEP" => self.finished_to_keep = num(value)?,
            "INTROSPECTION_TIMEOUT_SECS" => self.introspection_timeout_secs = num(value)?,
            "ARTIFACTS_DIR" => self.artifacts_dir = value.into(),
            "LOGS_DIR" => self.logs_dir = value.into(),
            "ITEMS_DIR" => self.items_dir = (!value.is_empty()).then(|| value.into()),
            "QUEUES_DIR" => self.queues_dir = value.into(),
            "WORK_DIR" => self.work_dir = value.into(),
            "VERIFY_SPIDERS" => {
                self.verify_spiders = match value.to_ascii_lowercase().as_str() {
                    "1" | "true" | "yes" | "on" => true,
                    "0" | "false" | "no" | "off" => false,
                    other => return Err(format!("invalid flag {other:?}")),
                }
            }
            "RUNNER" => self.runner.program = value.to_owned(),
            "QUEUE" => {
                self.queue = match value {
                    "in_memory" => QueueBackendConfig::InMemory,
                    "file" => QueueBackendConfig::File,
                    other => return Err(format!("unknown queue backend {other:?}")),
                }
            }
            "VERSION_ORDER" => {
                self.version_order = match value {
                    "lexicographic" => VersionOrderConfig::Lexicographic,
                    "natural" => VersionOrderConfig::Natural,
                    other => return Err(format!("unknown version order {other:?}")),
                }
            }
            // Other CRAWLD_* names belong to the worker process contract.
            _ => {}
        }
        Ok(())
    }

    /// Slot count after resolving the per-CPU default.
    pub fn effective_max_jobs(&self) -> usize {
        if self.max_concurrent_jobs > 0 {
            self.max_concurrent_jobs
        } else {
            num_cpus::get().max(1) * self.max_jobs_per_cpu
        }
    }

    /// Launcher tick interval.
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Introspection timeout.
    pub const fn introspection_timeout(&self) -> Duration {
        Duration::from_secs(self.introspection_timeout_secs)
    }
}

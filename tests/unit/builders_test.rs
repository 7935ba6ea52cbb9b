//! Tests for component builders

use crawld::builders::build_components;
use crawld::config::{QueueBackendConfig, ServiceConfig};
use crawld::core::{CoreError, NewJob, ProjectQueue};
use crawld::infra::queue::JsonlQueue;

fn config(root: &std::path::Path, queue: QueueBackendConfig) -> ServiceConfig {
    ServiceConfig {
        artifacts_dir: root.join("eggs"),
        logs_dir: root.join("logs"),
        queues_dir: root.join("dbs"),
        work_dir: root.join("work"),
        queue,
        ..ServiceConfig::default()
    }
}

#[test]
fn test_build_rejects_invalid_config() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = ServiceConfig {
        poll_interval_ms: 0,
        ..config(dir.path(), QueueBackendConfig::InMemory)
    };
    assert!(matches!(build_components(&cfg), Err(CoreError::Config(_))));
}

#[test]
fn test_file_backend_resumes_pending_jobs() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path(), QueueBackendConfig::File);

    let first = build_components(&cfg).unwrap();
    let id = first.tracker.create(NewJob::new("mybot", "spider1")).unwrap();
    drop(first);

    let queue = JsonlQueue::open(dir.path().join("dbs"), "mybot").unwrap();
    assert_eq!(queue.len(), 1);

    let second = build_components(&cfg).unwrap();
    assert_eq!(second.tracker.projects(), vec!["mybot"]);
    let claimed = second.tracker.claim_next("mybot").unwrap().unwrap();
    assert_eq!(claimed.id(), id);
}

#[test]
fn test_in_memory_backend_starts_empty() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path(), QueueBackendConfig::InMemory);
    let components = build_components(&cfg).unwrap();
    components.tracker.create(NewJob::new("p", "s")).unwrap();
    drop(components);
    let components = build_components(&cfg).unwrap();
    assert!(components.tracker.snapshot().is_empty());
    assert!(!dir.path().join("dbs").exists());
}

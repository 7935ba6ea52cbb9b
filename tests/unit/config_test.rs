//! Tests for configuration validation

use std::path::PathBuf;

use crawld::config::{QueueBackendConfig, RunnerConfig, ServiceConfig, VersionOrderConfig};

#[test]
fn test_default_config_is_valid() {
    let cfg = ServiceConfig::default();
    assert!(cfg.validate().is_ok());
    assert_eq!(cfg.queue, QueueBackendConfig::File);
    assert_eq!(cfg.version_order, VersionOrderConfig::Lexicographic);
    assert!(cfg.verify_spiders);
}

#[test]
fn test_zero_poll_interval_rejected() {
    let cfg = ServiceConfig {
        poll_interval_ms: 0,
        ..ServiceConfig::default()
    };
    assert!(cfg.validate().is_err());
}

#[test]
fn test_zero_slots_needs_per_cpu() {
    let cfg = ServiceConfig {
        max_concurrent_jobs: 0,
        max_jobs_per_cpu: 0,
        ..ServiceConfig::default()
    };
    assert!(cfg.validate().is_err());
}

#[test]
fn test_empty_runner_rejected() {
    let cfg = ServiceConfig {
        runner: RunnerConfig {
            program: " ".to_string(),
            ..RunnerConfig::default()
        },
        ..ServiceConfig::default()
    };
    assert!(cfg.validate().is_err());
}

#[test]
fn test_from_json_str_partial() {
    let json = r#"{
        "max_concurrent_jobs": 2,
        "poll_interval_ms": 100,
        "artifacts_dir": "/srv/eggs",
        "items_dir": "/srv/items",
        "queue": "in_memory",
        "version_order": "natural",
        "runner": {"program": "python3", "args": ["-m", "runner"]}
    }"#;
    let cfg = ServiceConfig::from_json_str(json).unwrap();
    assert_eq!(cfg.max_concurrent_jobs, 2);
    assert_eq!(cfg.artifacts_dir, PathBuf::from("/srv/eggs"));
    assert_eq!(cfg.items_dir, Some(PathBuf::from("/srv/items")));
    assert_eq!(cfg.queue, QueueBackendConfig::InMemory);
    assert_eq!(cfg.version_order, VersionOrderConfig::Natural);
    assert_eq!(cfg.runner.args, vec!["-m", "runner"]);
    assert_eq!(cfg.finished_to_keep, 100);
}

#[test]
fn test_from_json_str_invalid() {
    assert!(ServiceConfig::from_json_str("not json").is_err());
    assert!(ServiceConfig::from_json_str(r#"{"poll_interval_ms": 0}"#).is_err());
    assert!(ServiceConfig::from_json_str(r#"{"queue": "postgres"}"#).is_err());
}

#[test]
fn test_unknown_env_values_rejected() {
    let vars = [("CRAWLD_QUEUE".to_string(), "redis".to_string())];
    assert!(ServiceConfig::from_vars(vars).is_err());
    let vars = [("CRAWLD_VERIFY_SPIDERS".to_string(), "maybe".to_string())];
    assert!(ServiceConfig::from_vars(vars).is_err());
}

#[test]
fn test_worker_contract_vars_ignored() {
    let vars = [
        ("CRAWLD_PROJECT".to_string(), "p".to_string()),
        ("CRAWLD_VERIFY_SPIDERS".to_string(), "off".to_string()),
    ];
    let cfg = ServiceConfig::from_vars(vars).unwrap();
    assert!(!cfg.verify_spiders);
}

#[test]
fn test_version_order_config_builds_order() {
    let natural = VersionOrderConfig::Natural.build();
    let mut versions = vec!["r10".to_string(), "r2".to_string()];
    natural.sort(&mut versions);
    assert_eq!(versions, vec!["r2", "r10"]);
}

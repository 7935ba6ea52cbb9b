//! Tests for error types

use crawld::core::{CoreError, ValidationError};

#[test]
fn test_traversal_error_display() {
    let err = ValidationError::DirectoryTraversal {
        field: "project",
        value: "../x".to_string(),
    };
    assert_eq!(format!("{err}"), "directory traversal in project: \"../x\"");
}

#[test]
fn test_validation_is_transparent() {
    let err: CoreError = ValidationError::Empty { field: "spider" }.into();
    assert_eq!(format!("{err}"), "spider must not be empty");
    assert!(err.is_client_error());
}

#[test]
fn test_not_found_error() {
    let err = CoreError::NotFound("project mybot".to_string());
    assert_eq!(format!("{err}"), "not found: project mybot");
    assert!(err.is_client_error());
}

#[test]
fn test_storage_error_context() {
    let err = CoreError::storage("/var/eggs", "permission denied");
    assert_eq!(format!("{err}"), "storage error: /var/eggs: permission denied");
    assert!(!err.is_client_error());
}

#[test]
fn test_config_error() {
    let err = CoreError::Config("poll_interval_ms must be positive".to_string());
    assert_eq!(
        format!("{err}"),
        "invalid configuration: poll_interval_ms must be positive"
    );
    assert!(!err.is_client_error());
}

#[test]
fn test_invalid_transition_error() {
    let err = CoreError::InvalidTransition {
        job_id: "j1".to_string(),
        reason: "already running".to_string(),
    };
    assert_eq!(format!("{err}"), "invalid transition for job j1: already running");
}

#[test]
fn test_introspection_error_keeps_output() {
    let err = CoreError::Introspection {
        message: "runner exited with exit status: 1".to_string(),
        stdout: String::new(),
        stderr: "ImportError".to_string(),
    };
    assert!(format!("{err}").starts_with("introspection failed"));
    if let CoreError::Introspection { stderr, .. } = err {
        assert_eq!(stderr, "ImportError");
    }
}

//! Shared path guard for untrusted identifiers.
//!
//! Every component that turns a project, version, spider or job id into a
//! filesystem location goes through [`validate_component`] first, so a value
//! can never address anything outside the root it is joined onto.

use std::path::{Path, PathBuf};

use super::error::ValidationError;

/// Field label for project names.
pub const PROJECT: &str = "project";
/// Field label for version strings.
pub const VERSION: &str = "version";
/// Field label for spider names.
pub const SPIDER: &str = "spider";
/// Field label for job identifiers.
pub const JOB: &str = "job";

/// Check that `value` is usable as a single path component.
///
/// Rejects empty values, `.`/`..`, anything containing a path separator
/// (which covers every `../` form) and NUL bytes.
pub fn validate_component<'a>(field: &'static str, value: &'a str) -> Result<&'a str, ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::Empty { field });
    }
    if value.contains('\0') {
        return Err(ValidationError::InvalidCharacter {
            field,
            value: value.to_owned(),
        });
    }
    let traversal = value == "." || value == ".." || value.contains(['/', '\\']);
    if traversal {
        return Err(ValidationError::DirectoryTraversal {
            field,
            value: value.to_owned(),
        });
    }
    Ok(value)
}

/// Validate a project name.
pub fn project(value: &str) -> Result<&str, ValidationError> {
    validate_component(PROJECT, value)
}

/// Validate a version string.
pub fn version(value: &str) -> Result<&str, ValidationError> {
    validate_component(VERSION, value)
}

/// Validate a spider name.
pub fn spider(value: &str) -> Result<&str, ValidationError> {
    validate_component(SPIDER, value)
}

/// Validate a job identifier.
pub fn job(value: &str) -> Result<&str, ValidationError> {
    validate_component(JOB, value)
}

/// Path of a per-job file: `<root>/<project>/<spider>/<job_id>.<ext>`.
///
/// This naming is the contract external log/items readers rely on.
pub fn job_file(
    root: &Path,
    project_name: &str,
    spider_name: &str,
    job_id: &str,
    ext: &str,
) -> Result<PathBuf, ValidationError> {
    let project_name = project(project_name)?;
    let spider_name = spider(spider_name)?;
    let job_id = job(job_id)?;
    Ok(root
        .join(project_name)
        .join(spider_name)
        .join(format!("{job_id}.{ext}")))
}

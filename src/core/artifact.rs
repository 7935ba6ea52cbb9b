//! Versioned project artifacts.

use super::error::CoreResult;

/// One stored version of a project package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Owning project.
    pub project: String,
    /// Version string.
    pub version: String,
    /// Opaque package bytes.
    pub data: Vec<u8>,
}

/// Storage seam for project packages.
///
/// Every method validates `project` and `version` before touching storage.
pub trait ArtifactStore: Send + Sync {
    /// Store `data` under `(project, version)`, replacing any previous bytes.
    fn put(&self, project: &str, version: &str, data: &[u8]) -> CoreResult<()>;

    /// Fetch an exact version, or the greatest version under the store's
    /// order when `version` is `None`.
    fn get(&self, project: &str, version: Option<&str>) -> CoreResult<Artifact>;

    /// Versions of `project` in ascending order. Empty for unknown projects.
    fn list_versions(&self, project: &str) -> CoreResult<Vec<String>>;

    /// Projects with at least one version, sorted by name.
    fn list_projects(&self) -> CoreResult<Vec<String>>;

    /// Remove one version. Removing the last version removes the project.
    fn delete_version(&self, project: &str, version: &str) -> CoreResult<()>;

    /// Remove a project with every version.
    fn delete_project(&self, project: &str) -> CoreResult<()>;

    /// Greatest version of `project`, if any.
    fn current_version(&self, project: &str) -> CoreResult<Option<String>> {
        Ok(self.list_versions(project)?.pop())
    }

    /// True when `project` has at least one version.
    fn contains_project(&self, project: &str) -> CoreResult<bool> {
        Ok(!self.list_versions(project)?.is_empty())
    }
}

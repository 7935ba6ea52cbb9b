//! In-memory artifact store for tests and ephemeral deployments.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::core::validate;
use crate::core::{Artifact, ArtifactStore, CoreError, CoreResult, Lexicographic, VersionOrder};

/// Map-backed artifact store.
pub struct InMemoryArtifactStore {
    projects: RwLock<HashMap<String, BTreeMap<String, Vec<u8>>>>,
    order: Arc<dyn VersionOrder>,
}

impl Default for InMemoryArtifactStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryArtifactStore {
    /// Empty store with lexicographic version order.
    pub fn new() -> Self {
        Self::with_order(Arc::new(Lexicographic))
    }

    /// Empty store with a custom version order.
    pub fn with_order(order: Arc<dyn VersionOrder>) -> Self {
        Self {
            projects: RwLock::new(HashMap::new()),
            order,
        }
    }
}

impl ArtifactStore for InMemoryArtifactStore {
    fn put(&self, project: &str, version: &str, data: &[u8]) -> CoreResult<()> {
        validate::project(project)?;
        validate::version(version)?;
        self.projects
            .write()
            .entry(project.to_owned())
            .or_default()
            .insert(version.to_owned(), data.to_vec());
        Ok(())
    }

    fn get(&self, project: &str, version: Option<&str>) -> CoreResult<Artifact> {
        validate::project(project)?;
        if let Some(v) = version {
            validate::version(v)?;
        }
        let projects = self.projects.read();
        let versions = projects
            .get(project)
            .ok_or_else(|| CoreError::NotFound(format!("project {project}")))?;
        let version = match version {
            Some(v) => v.to_owned(),
            None => {
                let names: Vec<String> = versions.keys().cloned().collect();
                self.order
                    .max(&names)
                    .cloned()
                    .ok_or_else(|| CoreError::NotFound(format!("project {project}")))?
            }
        };
        let data = versions
            .get(&version)
            .cloned()
            .ok_or_else(|| CoreError::NotFound(format!("version {version} of project {project}")))?;
        Ok(Artifact {
            project: project.to_owned(),
            version,
            data,
        })
    }

    fn list_versions(&self, project: &str) -> CoreResult<Vec<String>> {
        validate::project(project)?;
        let mut versions: Vec<String> = self
            .projects
            .read()
            .get(project)
            .map(|v| v.keys().cloned().collect())
            .unwrap_or_default();
        self.order.sort(&mut versions);
        Ok(versions)
    }

    fn list_projects(&self) -> CoreResult<Vec<String>> {
        let mut projects: Vec<String> = self.projects.read().keys().cloned().collect();
        projects.sort();
        Ok(projects)
    }

    fn delete_version(&self, project: &str, version: &str) -> CoreResult<()> {
        validate::project(project)?;
        validate::version(version)?;
        let mut projects = self.projects.write();
        let versions = projects
            .get_mut(project)
            .ok_or_else(|| CoreError::NotFound(format!("project {project}")))?;
        versions
            .remove(version)
            .ok_or_else(|| CoreError::NotFound(format!("version {version} of project {project}")))?;
        if versions.is_empty() {
            projects.remove(project);
        }
        Ok(())
    }

    fn delete_project(&self, project: &str) -> CoreResult<()> {
        validate::project(project)?;
        self.projects
            .write()
            .remove(project)
            .map(|_| ())
            .ok_or_else(|| CoreError::NotFound(format!("project {project}")))
    }

    fn current_version(&self, project: &str) -> CoreResult<Option<String>> {
        let versions = self.list_versions(project)?;
        Ok(self.order.max(&versions).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_version_removes_project() {
        let store = InMemoryArtifactStore::new();
        store.put("p", "r1", b"a").unwrap();
        assert!(store.contains_project("p").unwrap());
        store.delete_version("p", "r1").unwrap();
        assert!(!store.contains_project("p").unwrap());
        assert!(store.list_projects().unwrap().is_empty());
    }

    #[test]
    fn test_overwrite_replaces_bytes() {
        let store = InMemoryArtifactStore::new();
        store.put("p", "r1", b"a").unwrap();
        store.put("p", "r1", b"b").unwrap();
        assert_eq!(store.get("p", None).unwrap().data, b"b");
        assert_eq!(store.current_version("p").unwrap().as_deref(), Some("r1"));
    }
}

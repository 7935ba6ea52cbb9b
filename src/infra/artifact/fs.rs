//! Artifact store on the local filesystem.
//!
//! Layout: `<root>/<project>/<version>.egg`. Writes go through a temp file in
//! the project directory followed by a rename, so readers never observe a
//! partially written package.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::validate;
use crate::core::{Artifact, ArtifactStore, CoreError, CoreResult, Lexicographic, VersionOrder};

const EXTENSION: &str = "egg";

/// Directory-per-project artifact store.
pub struct FilesystemArtifactStore {
    root: PathBuf,
    order: Arc<dyn VersionOrder>,
    /// Serializes mutations so "last version removed" checks see a stable
    /// directory.
    write_lock: Mutex<()>,
}

impl std::fmt::Debug for FilesystemArtifactStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilesystemArtifactStore")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

impl FilesystemArtifactStore {
    /// Store rooted at `root` with the default lexicographic order.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_order(root, Arc::new(Lexicographic))
    }

    /// Store rooted at `root` ranking versions with `order`.
    pub fn with_order(root: impl Into<PathBuf>, order: Arc<dyn VersionOrder>) -> Self {
        Self {
            root: root.into(),
            order,
            write_lock: Mutex::new(()),
        }
    }

    /// Root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn project_dir(&self, project: &str) -> CoreResult<PathBuf> {
        Ok(self.root.join(validate::project(project)?))
    }

    fn version_path(&self, project: &str, version: &str) -> CoreResult<PathBuf> {
        let dir = self.project_dir(project)?;
        let version = validate::version(version)?;
        Ok(dir.join(format!("{version}.{EXTENSION}")))
    }

    fn read_versions(&self, dir: &Path) -> CoreResult<Vec<String>> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(CoreError::storage(dir.display(), e)),
        };
        let mut versions = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| CoreError::storage(dir.display(), e))?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                versions.push(stem.to_owned());
            }
        }
        self.order.sort(&mut versions);
        Ok(versions)
    }
}

impl ArtifactStore for FilesystemArtifactStore {
    fn put(&self, project: &str, version: &str, data: &[u8]) -> CoreResult<()> {
        let path = self.version_path(project, version)?;
        let dir = self.project_dir(project)?;
        let _guard = self.write_lock.lock();
        fs::create_dir_all(&dir).map_err(|e| CoreError::storage(dir.display(), e))?;
        let mut tmp =
            tempfile::NamedTempFile::new_in(&dir).map_err(|e| CoreError::storage(dir.display(), e))?;
        tmp.write_all(data)
            .and_then(|()| tmp.as_file().sync_all())
            .map_err(|e| CoreError::storage(path.display(), e))?;
        tmp.persist(&path)
            .map_err(|e| CoreError::storage(path.display(), e.error))?;
        tracing::info!(project, version, bytes = data.len(), "artifact stored");
        Ok(())
    }

    fn get(&self, project: &str, version: Option<&str>) -> CoreResult<Artifact> {
        let version = match version {
            Some(v) => validate::version(v)?.to_owned(),
            None => {
                let dir = self.project_dir(project)?;
                let versions = self.read_versions(&dir)?;
                self.order
                    .max(&versions)
                    .cloned()
                    .ok_or_else(|| CoreError::NotFound(format!("project {project}")))?
            }
        };
        let path = self.version_path(project, &version)?;
        match fs::read(&path) {
            Ok(data) => Ok(Artifact {
                project: project.to_owned(),
                version,
                data,
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(CoreError::NotFound(format!("version {version} of project {project}")))
            }
            Err(e) => Err(CoreError::storage(path.display(), e)),
        }
    }

    fn list_versions(&self, project: &str) -> CoreResult<Vec<String>> {
        let dir = self.project_dir(project)?;
        self.read_versions(&dir)
    }

    fn list_projects(&self) -> CoreResult<Vec<String>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(CoreError::storage(self.root.display(), e)),
        };
        let mut projects = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| CoreError::storage(self.root.display(), e))?;
            if !entry.path().is_dir() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            if validate::project(&name).is_ok() && !self.read_versions(&entry.path())?.is_empty() {
                projects.push(name);
            }
        }
        projects.sort();
        Ok(projects)
    }

    fn delete_version(&self, project: &str, version: &str) -> CoreResult<()> {
        let path = self.version_path(project, version)?;
        let dir = self.project_dir(project)?;
        let _guard = self.write_lock.lock();
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(CoreError::NotFound(format!("version {version} of project {project}")));
            }
            Err(e) => return Err(CoreError::storage(path.display(), e)),
        }
        tracing::info!(project, version, "artifact version deleted");
        if self.read_versions(&dir)?.is_empty() {
            fs::remove_dir_all(&dir).map_err(|e| CoreError::storage(dir.display(), e))?;
            tracing::info!(project, "last version removed, project deleted");
        }
        Ok(())
    }

    fn delete_project(&self, project: &str) -> CoreResult<()> {
        let dir = self.project_dir(project)?;
        let _guard = self.write_lock.lock();
        match fs::remove_dir_all(&dir) {
            Ok(()) => {
                tracing::info!(project, "project deleted");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Err(CoreError::NotFound(format!("project {project}"))),
            Err(e) => Err(CoreError::storage(dir.display(), e)),
        }
    }

    fn current_version(&self, project: &str) -> CoreResult<Option<String>> {
        let versions = self.list_versions(project)?;
        Ok(self.order.max(&versions).cloned())
    }
}

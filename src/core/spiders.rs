//! Spider enumeration and its per-project cache.
//!
//! The cache is keyed by project only and has no expiry. Deploying a new
//! version does not touch it; callers that want fresh results call
//! [`SpiderListCache::invalidate`] after a deploy or delete. A failed
//! introspection never stores anything.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::error::CoreResult;
use super::validate;

/// Enumerates the spiders of one project version.
#[async_trait]
pub trait SpiderIntrospector: Send + Sync {
    /// Spider names of `project` at `version`, or at its current version when
    /// `None`.
    async fn list_spiders(&self, project: &str, version: Option<&str>) -> CoreResult<Vec<String>>;
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<String, Vec<String>>,
    // Bumped by `invalidate`; `epoch` is bumped by `clear`.
    generations: HashMap<String, u64>,
    epoch: u64,
}

impl CacheState {
    fn generation(&self, project: &str) -> (u64, u64) {
        (self.epoch, self.generations.get(project).copied().unwrap_or(0))
    }
}

/// Project → spider names.
#[derive(Debug, Default)]
pub struct SpiderListCache {
    state: RwLock<CacheState>,
}

impl SpiderListCache {
    /// Empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached list for `project`, introspecting on a miss.
    ///
    /// Concurrent misses for one project may both introspect; the last one to
    /// finish wins. A result is only stored if no [`Self::invalidate`] or
    /// [`Self::clear`] happened while it was being computed.
    pub async fn get_or_populate(
        &self,
        project: &str,
        version: Option<&str>,
        introspector: &dyn SpiderIntrospector,
    ) -> CoreResult<Vec<String>> {
        validate::project(project)?;
        if let Some(version) = version {
            validate::version(version)?;
        }
        let generation = {
            let state = self.state.read();
            if let Some(hit) = state.entries.get(project) {
                return Ok(hit.clone());
            }
            state.generation(project)
        };
        let spiders = introspector.list_spiders(project, version).await?;
        let mut state = self.state.write();
        if state.generation(project) == generation {
            tracing::debug!(project, count = spiders.len(), "spider list cached");
            state.entries.insert(project.to_owned(), spiders.clone());
        } else {
            tracing::debug!(project, "spider list invalidated during introspection, not cached");
        }
        Ok(spiders)
    }

    /// Drop the entry for `project`. Returns whether one existed.
    pub fn invalidate(&self, project: &str) -> bool {
        let mut state = self.state.write();
        *state.generations.entry(project.to_owned()).or_default() += 1;
        let removed = state.entries.remove(project).is_some();
        if removed {
            tracing::debug!(project, "spider list invalidated");
        }
        removed
    }

    /// Peek without populating.
    pub fn cached(&self, project: &str) -> Option<Vec<String>> {
        self.state.read().entries.get(project).cloned()
    }

    /// Drop every entry.
    pub fn clear(&self) {
        let mut state = self.state.write();
        state.entries.clear();
        state.epoch += 1;
    }
}

//! Stock Module Registrations
//!
//! The task types a CMS node ships with. Each module owns its local state and
//! registers its task types, gated on the matching `SyncSettings` switch:
//!
//! - **`files`**: `UpdateFile` / `DeleteFile`, carrying file content as a binary payload.
//! - **`cache`**: `ClearCacheItem` / `ClearCache`, memory-only evictions.
//! - **`sessions`**: `RemoveUserSession`, a memory-only kick.

pub mod cache;
pub mod files;
pub mod sessions;

#[cfg(test)]
mod tests;

use crate::config::SyncSettings;
use crate::error::FarmResult;
use crate::tasks::registry::TaskRegistry;

use cache::LocalCache;
use files::FileSync;
use sessions::SessionStore;
use std::sync::Arc;

/// Local state the stock task handlers act on.
#[derive(Clone)]
pub struct SyncModules {
    pub files: Arc<FileSync>,
    pub cache: Arc<LocalCache>,
    pub sessions: Arc<SessionStore>,
}

impl SyncModules {
    pub fn new(files: Arc<FileSync>) -> Self {
        Self {
            files,
            cache: LocalCache::new(),
            sessions: SessionStore::new(),
        }
    }

    /// Registers every stock task type. Call once at start-up.
    pub fn register_all(
        &self,
        registry: &TaskRegistry,
        settings: &Arc<SyncSettings>,
    ) -> FarmResult<()> {
        let files = self.files.clone();
        let gate = settings.clone();
        registry.register(
            files::UPDATE_FILE,
            1,
            move || gate.files_enabled(),
            move |invocation| {
                let files = files.clone();
                async move { files.apply_update(invocation).await }
            },
        )?;

        let files = self.files.clone();
        let gate = settings.clone();
        registry.register(
            files::DELETE_FILE,
            1,
            move || gate.files_enabled(),
            move |invocation| {
                let files = files.clone();
                async move { files.apply_delete(invocation).await }
            },
        )?;

        let cache = self.cache.clone();
        let gate = settings.clone();
        registry.register(
            cache::CLEAR_CACHE_ITEM,
            1,
            move || gate.cache_enabled(),
            move |invocation| {
                let cache = cache.clone();
                async move { cache.apply_clear_item(&invocation) }
            },
        )?;

        let cache = self.cache.clone();
        let gate = settings.clone();
        registry.register(
            cache::CLEAR_CACHE,
            0,
            move || gate.cache_enabled(),
            move |invocation| {
                let cache = cache.clone();
                async move { cache.apply_clear(&invocation) }
            },
        )?;

        let sessions = self.sessions.clone();
        let gate = settings.clone();
        registry.register(
            sessions::REMOVE_USER_SESSION,
            1,
            move || gate.sessions_enabled(),
            move |invocation| {
                let sessions = sessions.clone();
                async move { sessions.apply_remove(&invocation) }
            },
        )?;

        Ok(())
    }
}

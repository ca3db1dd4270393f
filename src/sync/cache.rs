//! In-memory cache invalidation tasks. Both task types are memory-only: a missed
//! eviction on an unreachable node is harmless once that node restarts cold.

use crate::tasks::types::{Task, TaskInvocation, TaskTarget};

use anyhow::Result;
use dashmap::DashMap;
use std::sync::Arc;

pub const CLEAR_CACHE_ITEM: &str = "ClearCacheItem";
pub const CLEAR_CACHE: &str = "ClearCache";

#[derive(Default)]
pub struct LocalCache {
    entries: DashMap<String, serde_json::Value>,
}

impl LocalCache {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert(&self, key: impl Into<String>, value: serde_json::Value) {
        self.entries.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear_item_task(key: &str) -> Task {
        Task::new(CLEAR_CACHE_ITEM, TaskTarget::AllOthers)
            .arg(key)
            .memory_only(true)
    }

    pub fn clear_task() -> Task {
        Task::new(CLEAR_CACHE, TaskTarget::AllOthers).memory_only(true)
    }

    pub fn apply_clear_item(&self, invocation: &TaskInvocation) -> Result<()> {
        let key = invocation.arg(0)?;
        if self.entries.remove(key).is_some() {
            tracing::debug!("Evicted cache item '{}' on request of {}", key, invocation.sender);
        }
        Ok(())
    }

    pub fn apply_clear(&self, invocation: &TaskInvocation) -> Result<()> {
        let evicted = self.entries.len();
        self.entries.clear();
        tracing::debug!("Cleared {} cache item(s) on request of {}", evicted, invocation.sender);
        Ok(())
    }
}

//! Server Registry
//!
//! Holds every known farm member. Each record sits behind its own async mutex so
//! heartbeats for different servers never contend; the outer `DashMap` is only
//! touched long enough to clone the record handle.

use super::types::{ServerId, ServerRecord, ServerSnapshot};
use crate::error::{FarmError, FarmResult};

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

pub type ServerHandle = Arc<Mutex<ServerRecord>>;

pub struct ServerRegistry {
    servers: DashMap<ServerId, ServerHandle>,
}

impl ServerRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers a server administratively, before any heartbeat.
    ///
    /// Returns `false` and leaves the existing record untouched if the id is
    /// already known.
    pub fn register(&self, id: ServerId, enabled: bool) -> bool {
        let mut inserted = false;
        self.servers.entry(id.clone()).or_insert_with(|| {
            inserted = true;
            Arc::new(Mutex::new(ServerRecord::new(id.clone(), enabled)))
        });
        if inserted {
            tracing::info!("Registered server {} (enabled={})", id, enabled);
        }
        inserted
    }

    /// Returns the record for `id`, creating an enabled one if the server is new.
    pub fn get_or_create(&self, id: &ServerId) -> (ServerHandle, bool) {
        if let Some(handle) = self.servers.get(id) {
            return (handle.value().clone(), false);
        }

        let mut created = false;
        let handle = self
            .servers
            .entry(id.clone())
            .or_insert_with(|| {
                created = true;
                Arc::new(Mutex::new(ServerRecord::new(id.clone(), true)))
            })
            .value()
            .clone();

        if created {
            tracing::info!("Discovered new server {}", id);
        }
        (handle, created)
    }

    pub fn get(&self, id: &ServerId) -> Option<ServerHandle> {
        self.servers.get(id).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, id: &ServerId) -> bool {
        self.servers.contains_key(id)
    }

    /// Drops the record. The caller must hold the record's lock and mark it retired.
    pub(crate) fn remove_locked(&self, record: &mut ServerRecord) -> bool {
        record.retired = true;
        let removed = self.servers.remove(&record.id).is_some();
        if removed {
            tracing::info!("Removed server {} from the farm", record.id);
        }
        removed
    }

    pub async fn set_enabled(&self, id: &ServerId, enabled: bool) -> FarmResult<()> {
        let handle = self
            .get(id)
            .ok_or_else(|| FarmError::UnknownServer(id.0.clone()))?;
        let mut record = handle.lock().await;
        if record.enabled != enabled {
            tracing::info!("Server {} enabled: {} -> {}", id, record.enabled, enabled);
            record.enabled = enabled;
        }
        Ok(())
    }

    pub async fn snapshot(&self, id: &ServerId) -> Option<ServerSnapshot> {
        let handle = self.get(id)?;
        let record = handle.lock().await;
        Some(ServerSnapshot::from(&*record))
    }

    pub fn ids(&self) -> Vec<ServerId> {
        let mut ids: Vec<ServerId> = self
            .servers
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        ids.sort();
        ids
    }

    pub async fn snapshots(&self) -> Vec<ServerSnapshot> {
        let mut snapshots = Vec::new();
        for id in self.ids() {
            if let Some(snapshot) = self.snapshot(&id).await {
                snapshots.push(snapshot);
            }
        }
        snapshots
    }

    /// Servers a wildcard task fans out to: every enabled server except `sender`.
    ///
    /// Memory-only tasks additionally skip servers that are not currently reachable.
    pub async fn fan_out_targets(
        &self,
        sender: &ServerId,
        memory_only: bool,
    ) -> Vec<ServerSnapshot> {
        self.snapshots()
            .await
            .into_iter()
            .filter(|server| &server.id != sender && server.enabled)
            .filter(|server| !memory_only || server.status.accepts_memory_tasks())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }
}

impl Default for ServerRegistry {
    fn default() -> Self {
        Self {
            servers: DashMap::new(),
        }
    }
}

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::net::SocketAddr;

/// Identity of a farm member (typically the machine or instance name).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServerId(pub String);

impl ServerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Liveness classification derived from a server's ping history.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ServerStatus {
    Healthy,
    /// Warming up or degrading; pinging, but not often enough to count as synchronized.
    Transitioning,
    NotResponding,
    /// No ping for the whole dead window; treated as permanently gone.
    AutoDisabled,
}

impl ServerStatus {
    /// Whether best-effort tasks should still be handed to this server.
    pub fn accepts_memory_tasks(self) -> bool {
        matches!(self, ServerStatus::Healthy | ServerStatus::Transitioning)
    }
}

/// How the farm treats servers that go silent for the dead window.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MembershipMode {
    /// Servers join on first heartbeat and are removed when auto-disabled.
    Automatic,
    /// Servers are registered by an administrator and are never removed automatically.
    Manual,
}

/// One known farm member.
#[derive(Debug, Clone)]
pub struct ServerRecord {
    pub id: ServerId,
    pub enabled: bool,
    pub status: ServerStatus,
    /// Ping timestamps (ms since epoch) in arrival order.
    pub ping_history: VecDeque<u64>,
    pub heartbeat_addr: Option<SocketAddr>,
    pub http_addr: Option<SocketAddr>,
    /// Set under the record lock when the record is dropped from the registry,
    /// so a heartbeat that raced the removal knows to recreate it.
    pub(crate) retired: bool,
}

impl ServerRecord {
    pub fn new(id: ServerId, enabled: bool) -> Self {
        Self {
            id,
            enabled,
            status: ServerStatus::Transitioning,
            ping_history: VecDeque::new(),
            heartbeat_addr: None,
            http_addr: None,
            retired: false,
        }
    }

    pub fn last_ping(&self) -> Option<u64> {
        self.ping_history.back().copied()
    }

    /// Drops pings older than `horizon_ms`, always keeping the newest one so a
    /// server that has ever pinged is still distinguishable from one that never did.
    pub fn prune_before(&mut self, horizon_ms: u64) {
        while self.ping_history.len() > 1 {
            match self.ping_history.front() {
                Some(&oldest) if oldest < horizon_ms => {
                    self.ping_history.pop_front();
                }
                _ => break,
            }
        }
    }
}

/// Point-in-time view of a server record, safe to hand out of the registry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerSnapshot {
    pub id: ServerId,
    pub enabled: bool,
    pub status: ServerStatus,
    pub ping_count: usize,
    pub last_ping: Option<u64>,
    pub http_addr: Option<SocketAddr>,
}

impl From<&ServerRecord> for ServerSnapshot {
    fn from(record: &ServerRecord) -> Self {
        Self {
            id: record.id.clone(),
            enabled: record.enabled,
            status: record.status,
            ping_count: record.ping_history.len(),
            last_ping: record.last_ping(),
            http_addr: record.http_addr,
        }
    }
}

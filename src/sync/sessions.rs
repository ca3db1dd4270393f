//! User session kicks. `RemoveUserSession` is memory-only: a node that misses the
//! kick while unreachable holds no sessions once it restarts.

use crate::tasks::types::{Task, TaskInvocation, TaskTarget};

use anyhow::Result;
use dashmap::DashMap;
use std::sync::Arc;

pub const REMOVE_USER_SESSION: &str = "RemoveUserSession";

/// Sessions held by this node, keyed by user name.
#[derive(Default)]
pub struct SessionStore {
    sessions: DashMap<String, Vec<String>>,
}

impl SessionStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Records a new session for `user`.
    pub fn open(&self, user: &str, session_id: impl Into<String>) {
        self.sessions
            .entry(user.to_string())
            .or_default()
            .push(session_id.into());
    }

    /// Session ids currently open for `user`.
    pub fn sessions_of(&self, user: &str) -> Vec<String> {
        self.sessions
            .get(user)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    pub fn has_user(&self, user: &str) -> bool {
        self.sessions.contains_key(user)
    }

    /// Kicks `user` on every other node.
    pub fn kick_task(user: &str) -> Task {
        Task::new(REMOVE_USER_SESSION, TaskTarget::AllOthers)
            .arg(user)
            .memory_only(true)
    }

    /// Handler body: drops every session of the user named by argument 0.
    pub fn apply_remove(&self, invocation: &TaskInvocation) -> Result<()> {
        let user = invocation.arg(0)?;
        if let Some((_, sessions)) = self.sessions.remove(user) {
            tracing::info!(
                "Removed {} session(s) of '{}' on request of {}",
                sessions.len(),
                user,
                invocation.sender
            );
        }
        Ok(())
    }
}

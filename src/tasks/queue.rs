//! Task Inboxes
//!
//! One FIFO inbox per target server. Whatever delivers a task (the in-process
//! transport or the HTTP delivery endpoint) appends to the target's inbox, and that
//! server's single executor pops from the front, so tasks for one target are applied
//! in the order they were enqueued.
//!
//! ## Responsibilities
//! - **Ordering**: strict FIFO per target; no ordering across targets.
//! - **Purging**: dropping memory-only tasks of an unreachable server.
//! - **Removal**: discarding the whole inbox of a server that left the farm.

use super::types::TaskEnvelope;
use crate::farm::types::ServerId;

use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Arc;

pub struct TaskQueue {
    inboxes: DashMap<ServerId, VecDeque<Arc<TaskEnvelope>>>,
}

impl TaskQueue {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Appends a task to the back of `target`'s inbox.
    pub fn push(&self, target: &ServerId, envelope: Arc<TaskEnvelope>) {
        tracing::trace!(
            "Queued task {} ({}) for {}",
            envelope.id,
            envelope.task.type_tag(),
            target
        );
        self.inboxes
            .entry(target.clone())
            .or_default()
            .push_back(envelope);
    }

    /// Pops the oldest task in `target`'s inbox.
    pub fn pop(&self, target: &ServerId) -> Option<Arc<TaskEnvelope>> {
        self.inboxes
            .get_mut(target)
            .and_then(|mut inbox| inbox.pop_front())
    }

    pub fn pending(&self, target: &ServerId) -> usize {
        self.inboxes
            .get(target)
            .map(|inbox| inbox.len())
            .unwrap_or(0)
    }

    pub fn pending_memory_only(&self, target: &ServerId) -> usize {
        self.inboxes
            .get(target)
            .map(|inbox| {
                inbox
                    .iter()
                    .filter(|envelope| envelope.task.is_memory_only())
                    .count()
            })
            .unwrap_or(0)
    }

    /// Drops every memory-only task queued for `target`, keeping persisted ones in order.
    ///
    /// Returns the number of tasks dropped.
    pub fn purge_memory_only(&self, target: &ServerId) -> usize {
        let Some(mut inbox) = self.inboxes.get_mut(target) else {
            return 0;
        };
        let before = inbox.len();
        inbox.retain(|envelope| !envelope.task.is_memory_only());
        let purged = before - inbox.len();
        if purged > 0 {
            tracing::info!("Purged {} memory-only task(s) queued for {}", purged, target);
        }
        purged
    }

    /// Discards `target`'s inbox entirely. Returns the number of tasks dropped.
    pub fn remove_server(&self, target: &ServerId) -> usize {
        let dropped = self
            .inboxes
            .remove(target)
            .map(|(_, inbox)| inbox.len())
            .unwrap_or(0);
        if dropped > 0 {
            tracing::info!("Dropped {} queued task(s) of removed server {}", dropped, target);
        }
        dropped
    }

    pub fn total_pending(&self) -> usize {
        self.inboxes.iter().map(|inbox| inbox.value().len()).sum()
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self {
            inboxes: DashMap::new(),
        }
    }
}

//! Task Registry
//!
//! Maps task-type tags (e.g. "UpdateFile") to a condition and an async handler.
//! Every module that needs farm synchronization registers its task types once at
//! start-up; afterwards the registry is only read, from any number of dispatchers
//! and executors at once.

use super::types::TaskInvocation;
use crate::error::{FarmError, FarmResult};

use anyhow::Result;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Farm-configuration gate deciding whether a task type applies right now.
pub type ConditionFn = Arc<dyn Fn() -> bool + Send + Sync>;

/// Type-erased async handler.
pub type TaskHandlerFn = Arc<
    dyn Fn(TaskInvocation) -> Pin<Box<dyn Future<Output = Result<()>> + Send>> + Send + Sync,
>;

/// Everything registered under one tag.
pub struct TaskDefinition {
    type_tag: String,
    arity: usize,
    condition: ConditionFn,
    handler: TaskHandlerFn,
}

impl TaskDefinition {
    pub fn type_tag(&self) -> &str {
        &self.type_tag
    }

    /// Number of positional text arguments the handler expects.
    pub fn arity(&self) -> usize {
        self.arity
    }

    pub fn condition_holds(&self) -> bool {
        (self.condition)()
    }

    pub fn check_arity(&self, text_data: &[String]) -> FarmResult<()> {
        if text_data.len() != self.arity {
            return Err(FarmError::MalformedTaskPayload {
                type_tag: self.type_tag.clone(),
                reason: format!(
                    "expected {} text argument(s), got {}",
                    self.arity,
                    text_data.len()
                ),
            });
        }
        Ok(())
    }

    pub fn invoke(
        &self,
        invocation: TaskInvocation,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send>> {
        (self.handler)(invocation)
    }
}

pub struct TaskRegistry {
    definitions: DashMap<String, Arc<TaskDefinition>>,
}

impl TaskRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers a task type.
    ///
    /// # Arguments
    /// * `type_tag` - Identifier shared by every node in the farm.
    /// * `arity` - Exact number of text arguments the handler takes.
    /// * `condition` - Evaluated at dispatch and again at execution.
    /// * `handler` - The side-effecting body.
    ///
    /// # Errors
    /// `DuplicateTaskType` if the tag is taken; the existing definition stays active.
    pub fn register<C, F, Fut>(
        &self,
        type_tag: &str,
        arity: usize,
        condition: C,
        handler: F,
    ) -> FarmResult<()>
    where
        C: Fn() -> bool + Send + Sync + 'static,
        F: Fn(TaskInvocation) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let handler_fn: TaskHandlerFn = Arc::new(move |invocation: TaskInvocation| {
            Box::pin(handler(invocation)) as Pin<Box<dyn Future<Output = Result<()>> + Send>>
        });

        match self.definitions.entry(type_tag.to_string()) {
            Entry::Occupied(_) => {
                tracing::error!("Task type '{}' registered twice", type_tag);
                Err(FarmError::DuplicateTaskType(type_tag.to_string()))
            }
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(TaskDefinition {
                    type_tag: type_tag.to_string(),
                    arity,
                    condition: Arc::new(condition),
                    handler: handler_fn,
                }));
                tracing::info!("Registered task type: {} (arity {})", type_tag, arity);
                Ok(())
            }
        }
    }

    pub fn lookup(&self, type_tag: &str) -> FarmResult<Arc<TaskDefinition>> {
        self.definitions
            .get(type_tag)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| FarmError::UnregisteredTaskType(type_tag.to_string()))
    }

    pub fn has_task(&self, type_tag: &str) -> bool {
        self.definitions.contains_key(type_tag)
    }

    pub fn type_tags(&self) -> Vec<String> {
        let mut tags: Vec<String> = self
            .definitions
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        tags.sort();
        tags
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self {
            definitions: DashMap::new(),
        }
    }
}

//! Task Dispatcher
//!
//! Entry point for business code that has just mutated shared state locally.
//! The dispatcher filters the task through its condition and hands it to the
//! transport. A registry miss is the only way a dispatch fails: it means the caller
//! used a tag nobody registered, which is a programming error.

use super::registry::TaskRegistry;
use super::transport::Transport;
use super::types::{DispatchOutcome, Task, TaskEnvelope, TaskId};
use crate::error::FarmResult;
use crate::farm::clock::Clock;
use crate::farm::types::ServerId;

use std::sync::Arc;

pub struct TaskDispatcher {
    local: ServerId,
    registry: Arc<TaskRegistry>,
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
}

impl TaskDispatcher {
    pub fn new(
        local: ServerId,
        registry: Arc<TaskRegistry>,
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        Arc::new(Self {
            local,
            registry,
            transport,
            clock,
        })
    }

    pub fn local_server(&self) -> &ServerId {
        &self.local
    }

    /// Propagates a local mutation to the farm.
    ///
    /// Successive calls from one caller reach each target in call order.
    ///
    /// # Errors
    /// * `UnregisteredTaskType` if the tag is unknown.
    /// * `MalformedTaskPayload` if the condition holds but the argument count is wrong.
    ///
    /// Transport failures are not errors: they are logged and reported as
    /// `DispatchOutcome::Undelivered` so the caller's own mutation stands.
    pub async fn dispatch(&self, task: Task) -> FarmResult<DispatchOutcome> {
        let definition = self.registry.lookup(task.type_tag())?;

        if !definition.condition_holds() {
            tracing::trace!("Condition false for {}, task discarded", task.type_tag());
            return Ok(DispatchOutcome::SkippedCondition);
        }

        definition.check_arity(task.text_data())?;

        let envelope = TaskEnvelope {
            id: TaskId::new(),
            sender: self.local.clone(),
            created_at: self.clock.now_ms(),
            task,
        };
        let task_id = envelope.id.clone();

        tracing::debug!(
            "Dispatching task {} ({} -> {}, memory_only={})",
            task_id,
            envelope.task.type_tag(),
            envelope.task.target(),
            envelope.task.is_memory_only()
        );

        match self.transport.send(envelope).await {
            Ok(targets) => Ok(DispatchOutcome::Dispatched { task_id, targets }),
            Err(e) => {
                tracing::warn!("Task {} could not be handed to transport: {}", task_id, e);
                Ok(DispatchOutcome::Undelivered {
                    task_id,
                    reason: e.to_string(),
                })
            }
        }
    }
}

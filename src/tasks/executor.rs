//! Task Executor
//!
//! Drains one server's inbox in order and applies each task.
//!
//! ## Responsibilities
//! - **Re-validation**: the condition is checked again, since farm settings may have
//!   changed after the sender dispatched.
//! - **Shape check**: argument count must match the registered arity.
//! - **Isolation**: a failing or panicking handler is logged and the task counted as
//!   consumed; the next task runs regardless.

use super::queue::TaskQueue;
use super::registry::TaskRegistry;
use super::types::{ExecutionOutcome, TaskEnvelope, TaskInvocation};
use crate::farm::types::ServerId;

use std::sync::Arc;
use std::time::Duration;

pub struct TaskExecutor {
    /// Server whose inbox this executor drains.
    server: ServerId,
    queue: Arc<TaskQueue>,
    registry: Arc<TaskRegistry>,
    poll_interval: Duration,
}

impl TaskExecutor {
    pub fn new(
        server: ServerId,
        queue: Arc<TaskQueue>,
        registry: Arc<TaskRegistry>,
        poll_interval: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            server,
            queue,
            registry,
            poll_interval,
        })
    }

    /// Spawns the worker loop and returns its handle.
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tracing::info!("Starting task executor for {}", self.server);
        tokio::spawn(async move {
            self.worker_loop().await;
        })
    }

    async fn worker_loop(&self) {
        loop {
            let executed = self.run_pending().await;
            if executed == 0 {
                tokio::time::sleep(self.poll_interval).await;
            }
        }
    }

    /// Executes every task currently queued for this server, oldest first.
    ///
    /// Returns how many tasks were taken off the inbox.
    pub async fn run_pending(&self) -> usize {
        let mut taken = 0;
        while let Some(envelope) = self.queue.pop(&self.server) {
            taken += 1;
            self.execute_received(&envelope).await;
        }
        taken
    }

    /// Applies a single delivered task.
    pub async fn execute_received(&self, envelope: &TaskEnvelope) -> ExecutionOutcome {
        let type_tag = envelope.task.type_tag();

        let definition = match self.registry.lookup(type_tag) {
            Ok(definition) => definition,
            Err(e) => {
                tracing::warn!(
                    "Skipping task {} from {}: {} (sender runs a newer version?)",
                    envelope.id,
                    envelope.sender,
                    e
                );
                return ExecutionOutcome::SkippedUnregistered;
            }
        };

        if !definition.condition_holds() {
            tracing::debug!(
                "Skipping task {} ({}): condition no longer holds",
                envelope.id,
                type_tag
            );
            return ExecutionOutcome::SkippedCondition;
        }

        if let Err(e) = definition.check_arity(envelope.task.text_data()) {
            tracing::error!("Skipping task {} from {}: {}", envelope.id, envelope.sender, e);
            return ExecutionOutcome::Malformed(e.to_string());
        }

        tracing::debug!(
            "Executing task {} ({}) from {}",
            envelope.id,
            type_tag,
            envelope.sender
        );

        // Run on its own task so a panic in the handler is contained here.
        let handler = definition.invoke(TaskInvocation::from_envelope(envelope));
        match tokio::spawn(handler).await {
            Ok(Ok(())) => {
                tracing::trace!("Task {} executed", envelope.id);
                ExecutionOutcome::Executed
            }
            Ok(Err(e)) => {
                tracing::error!("Task {} ({}) failed: {:#}", envelope.id, type_tag, e);
                ExecutionOutcome::Failed(e.to_string())
            }
            Err(join_error) => {
                tracing::error!(
                    "Task {} ({}) handler aborted: {}",
                    envelope.id,
                    type_tag,
                    join_error
                );
                ExecutionOutcome::Failed(join_error.to_string())
            }
        }
    }
}

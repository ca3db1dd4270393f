use super::payload::BinaryPayload;
use crate::farm::types::ServerId;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier of a dispatched task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which servers should apply a task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum TaskTarget {
    /// A single named server.
    Server(ServerId),
    /// Every enabled server except the sender.
    AllOthers,
}

impl TaskTarget {
    pub fn includes(&self, server: &ServerId) -> bool {
        match self {
            TaskTarget::Server(id) => id == server,
            TaskTarget::AllOthers => true,
        }
    }
}

impl fmt::Display for TaskTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskTarget::Server(id) => write!(f, "{}", id),
            TaskTarget::AllOthers => f.write_str("*"),
        }
    }
}

/// One unit of cross-node work, built by business code and handed to the dispatcher.
///
/// Fields are private: once built, a task is only ever read.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    type_tag: String,
    target: TaskTarget,
    text_data: Vec<String>,
    binary_data: Option<BinaryPayload>,
    memory_only: bool,
}

impl Task {
    /// Starts a persisted task with no arguments and no payload.
    pub fn new(type_tag: impl Into<String>, target: TaskTarget) -> Self {
        Self {
            type_tag: type_tag.into(),
            target,
            text_data: Vec::new(),
            binary_data: None,
            memory_only: false,
        }
    }

    /// Appends one positional argument.
    pub fn arg(mut self, value: impl Into<String>) -> Self {
        self.text_data.push(value.into());
        self
    }

    /// Appends several positional arguments, in order.
    pub fn args<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.text_data.extend(values.into_iter().map(Into::into));
        self
    }

    /// Attaches file content; replaces any earlier payload.
    pub fn binary(mut self, payload: impl Into<BinaryPayload>) -> Self {
        self.binary_data = Some(payload.into());
        self
    }

    /// Marks the task best-effort: delivered at most once, never retried, and
    /// dropped for servers that are not reachable.
    pub fn memory_only(mut self, memory_only: bool) -> Self {
        self.memory_only = memory_only;
        self
    }

    /// Tag the task was registered under.
    pub fn type_tag(&self) -> &str {
        &self.type_tag
    }

    /// Servers that should apply the task.
    pub fn target(&self) -> &TaskTarget {
        &self.target
    }

    /// Positional text arguments.
    pub fn text_data(&self) -> &[String] {
        &self.text_data
    }

    /// Attached file content, if any.
    pub fn binary_data(&self) -> Option<&BinaryPayload> {
        self.binary_data.as_ref()
    }

    pub fn is_memory_only(&self) -> bool {
        self.memory_only
    }
}

/// A dispatched task as it travels through the transport and sits in inboxes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskEnvelope {
    pub id: TaskId,
    pub sender: ServerId,
    /// Timestamp (ms) of the dispatch on the sender.
    pub created_at: u64,
    pub task: Task,
}

/// What a registered handler receives.
#[derive(Debug, Clone)]
pub struct TaskInvocation {
    pub task_id: TaskId,
    pub sender: ServerId,
    pub target: TaskTarget,
    pub text_data: Vec<String>,
    /// `None` is meaningful (e.g. "no file to write"), not an error.
    pub binary_data: Option<BinaryPayload>,
}

impl TaskInvocation {
    pub fn from_envelope(envelope: &TaskEnvelope) -> Self {
        Self {
            task_id: envelope.id.clone(),
            sender: envelope.sender.clone(),
            target: envelope.task.target().clone(),
            text_data: envelope.task.text_data().to_vec(),
            binary_data: envelope.task.binary_data().cloned(),
        }
    }

    /// Positional argument `index`; arity is validated before handlers run.
    pub fn arg(&self, index: usize) -> anyhow::Result<&str> {
        self.text_data
            .get(index)
            .map(String::as_str)
            .ok_or_else(|| anyhow::anyhow!("missing task argument {}", index))
    }
}

/// Result of a dispatch call that did not fail outright.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// Handed to the transport, which accepted it for `targets` inboxes.
    Dispatched { task_id: TaskId, targets: usize },
    /// The condition was false; nothing left the process.
    SkippedCondition,
    /// The transport refused the hand-off. The local mutation is unaffected.
    Undelivered { task_id: TaskId, reason: String },
}

/// Result of executing one received task. Never aborts the executor loop.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    Executed,
    /// Sender knows a task type this node does not.
    SkippedUnregistered,
    /// Condition false at execution time.
    SkippedCondition,
    Malformed(String),
    Failed(String),
}

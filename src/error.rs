//! Error types for farm task synchronization and server monitoring.

use thiserror::Error;

/// Errors surfaced by the registry, dispatcher, transports and configuration.
///
/// Execute-time problems are never returned to the executor loop as errors;
/// they are folded into an `ExecutionOutcome` and logged there.
#[derive(Debug, Error)]
pub enum FarmError {
    /// No task definition exists for the tag.
    #[error("Unregistered task type: {0}")]
    UnregisteredTaskType(String),

    /// A second definition was registered under an existing tag.
    #[error("Task type already registered: {0}")]
    DuplicateTaskType(String),

    /// Argument count or binary payload does not match what the handler expects.
    #[error("Malformed payload for task '{type_tag}': {reason}")]
    MalformedTaskPayload { type_tag: String, reason: String },

    /// The registered handler returned an error or panicked.
    #[error("Handler for task '{type_tag}' failed: {reason}")]
    HandlerExecutionFailure { type_tag: String, reason: String },

    /// The transport boundary refused the hand-off.
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Unknown server: {0}")]
    UnknownServer(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type FarmResult<T> = Result<T, FarmError>;

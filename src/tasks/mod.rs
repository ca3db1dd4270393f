//! Farm Task Synchronization Module
//!
//! Turns a local mutation into side effects on the other farm members.
//!
//! ## Pipeline
//! 1. **Registration**: every module registers its task types (tag, arity, condition,
//!    handler) in the `TaskRegistry` once at start-up.
//! 2. **Dispatch**: business code builds a `Task` and calls `TaskDispatcher::dispatch`.
//!    The condition is evaluated; a false condition discards the task silently.
//! 3. **Transport**: the task is wrapped in a `TaskEnvelope` and handed to a
//!    `Transport`, which fans wildcard targets out to per-server inboxes.
//! 4. **Execution**: each server's `TaskExecutor` drains its inbox in order,
//!    re-checks the condition and arity, and runs the handler in isolation.
//!
//! ## Submodules
//! - **`types`**: tasks, targets, envelopes and outcomes.
//! - **`payload`**: binary payloads and their integrity-checked wire form.
//! - **`registry`**: tag -> definition table.
//! - **`dispatcher`** / **`executor`**: the two ends of the pipeline.
//! - **`queue`**: per-server FIFO inboxes.
//! - **`transport`**: the hand-off boundary (in-process and HTTP).
//! - **`protocol`** / **`handlers`**: HTTP delivery contract and endpoint.

pub mod dispatcher;
pub mod executor;
pub mod handlers;
pub mod payload;
pub mod protocol;
pub mod queue;
pub mod registry;
pub mod transport;
pub mod types;

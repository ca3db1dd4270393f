//! Web Farm Synchronization Library
//!
//! Keeps a farm of application servers consistent when any one of them mutates
//! shared state, and tracks which farm members are alive.
//!
//! ## Architecture Modules
//! - **`tasks`**: the task pipeline. Modules register task types; business code
//!   dispatches tasks; each target server executes them in order after re-checking
//!   their condition. File content travels as integrity-checked binary payloads.
//! - **`farm`**: the server registry, heartbeat exchange and the health state machine
//!   (`Healthy` / `Transitioning` / `NotResponding` / `AutoDisabled`) with its
//!   corrective actions.
//! - **`sync`**: the stock task types (file sync, cache eviction, session kicks).
//! - **`config`**: node configuration, health policy windows and farm-wide switches.
//! - **`error`**: the error taxonomy shared by all of the above.

pub mod config;
pub mod error;
pub mod farm;
pub mod sync;
pub mod tasks;

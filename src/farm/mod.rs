//! Farm Membership & Health Module
//!
//! Tracks which servers belong to the farm and how alive each one is.
//!
//! ## Core Mechanisms
//! - **Server Registry**: one record per server, each behind its own lock.
//! - **Heartbeats**: UDP pings recorded into each server's ping history.
//! - **Health Classification**: `Healthy` / `Transitioning` / `NotResponding` /
//!   `AutoDisabled`, derived from ping counts over explicit time windows.
//! - **Corrective Actions**: alerting on `NotResponding`; removing the server (automatic
//!   membership) or purging its memory-only tasks (manual membership) on `AutoDisabled`.

pub mod alerts;
pub mod clock;
pub mod handlers;
pub mod heartbeat;
pub mod monitor;
pub mod protocol;
pub mod registry;
pub mod types;

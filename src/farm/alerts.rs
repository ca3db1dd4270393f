//! Alert sink for health transitions that need an operator's attention.

use super::types::{ServerId, ServerStatus};

#[derive(Debug, Clone, PartialEq)]
pub struct HealthAlert {
    pub server: ServerId,
    pub previous: ServerStatus,
    pub current: ServerStatus,
    pub last_ping: Option<u64>,
    pub observed_at: u64,
}

pub trait AlertSink: Send + Sync {
    fn notify(&self, alert: &HealthAlert);
}

/// Emits alerts as `warn!` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAlertSink;

impl AlertSink for TracingAlertSink {
    fn notify(&self, alert: &HealthAlert) {
        tracing::warn!(
            server = %alert.server,
            previous = ?alert.previous,
            last_ping = ?alert.last_ping,
            "Server {} is not responding",
            alert.server
        );
    }
}

use super::types::{ServerId, ServerSnapshot, ServerStatus};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

pub const ENDPOINT_SERVER_STATUS: &str = "/farm/status/:id";
pub const ENDPOINT_SERVERS: &str = "/farm/servers";
pub const ENDPOINT_SERVER_ENABLED: &str = "/farm/servers/:id/enabled";

/// UDP heartbeat datagram, `bincode`-encoded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum HeartbeatMessage {
    Ping {
        from: ServerId,
        /// Sender's clock, ms since epoch.
        sent_at_ms: u64,
        heartbeat_addr: SocketAddr,
        http_addr: SocketAddr,
    },
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub server_id: ServerId,
    pub status: ServerStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ServersResponse {
    pub servers: Vec<ServerSnapshot>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SetEnabledRequest {
    pub enabled: bool,
}

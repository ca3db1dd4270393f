use super::monitor::HeartbeatMonitor;
use super::protocol::*;
use super::types::ServerId;

use axum::{Extension, Json, extract::Path, http::StatusCode};
use std::sync::Arc;

pub async fn handle_get_status(
    Extension(monitor): Extension<Arc<HeartbeatMonitor>>,
    Path(server_id): Path<String>,
) -> (StatusCode, Json<Option<StatusResponse>>) {
    let server_id = ServerId(server_id);

    match monitor.get_status(&server_id).await {
        Some(status) => (
            StatusCode::OK,
            Json(Some(StatusResponse { server_id, status })),
        ),
        None => {
            tracing::debug!("Status query for unknown server {}", server_id);
            (StatusCode::NOT_FOUND, Json(None))
        }
    }
}

pub async fn handle_list_servers(
    Extension(monitor): Extension<Arc<HeartbeatMonitor>>,
) -> (StatusCode, Json<ServersResponse>) {
    monitor.sweep().await;
    let servers = monitor.registry().snapshots().await;
    (StatusCode::OK, Json(ServersResponse { servers }))
}

pub async fn handle_set_enabled(
    Extension(monitor): Extension<Arc<HeartbeatMonitor>>,
    Path(server_id): Path<String>,
    Json(req): Json<SetEnabledRequest>,
) -> StatusCode {
    let server_id = ServerId(server_id);

    match monitor.registry().set_enabled(&server_id, req.enabled).await {
        Ok(()) => {
            monitor.get_status(&server_id).await;
            StatusCode::OK
        }
        Err(e) => {
            tracing::warn!("Failed to update server {}: {}", server_id, e);
            StatusCode::NOT_FOUND
        }
    }
}

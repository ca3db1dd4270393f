use super::protocol::*;
use super::queue::TaskQueue;

use crate::farm::types::ServerId;

use axum::{Extension, Json, http::StatusCode};
use std::sync::Arc;

/// Identity of the node serving the HTTP routes.
#[derive(Debug, Clone)]
pub struct LocalServer(pub ServerId);

/// Receives a task from a peer and appends it to this node's inbox.
///
/// Binary payloads are verified while the body is decoded; a corrupted payload is
/// rejected by the `Json` extractor before reaching this handler.
pub async fn handle_deliver_task(
    Extension(queue): Extension<Arc<TaskQueue>>,
    Extension(LocalServer(local)): Extension<LocalServer>,
    Json(req): Json<DeliverTaskRequest>,
) -> (StatusCode, Json<DeliverTaskResponse>) {
    let envelope = req.envelope;
    let task_id = envelope.id.clone();

    if !envelope.task.target().includes(&local) {
        tracing::warn!(
            "Rejecting task {} addressed to {} (this is {})",
            task_id,
            envelope.task.target(),
            local
        );
        return (
            StatusCode::BAD_REQUEST,
            Json(DeliverTaskResponse {
                task_id,
                accepted: false,
                reason: Some(format!("task is not addressed to {}", local)),
            }),
        );
    }

    tracing::debug!(
        "Received task {} ({}) from {}",
        task_id,
        envelope.task.type_tag(),
        envelope.sender
    );
    queue.push(&local, Arc::new(envelope));

    (
        StatusCode::OK,
        Json(DeliverTaskResponse {
            task_id,
            accepted: true,
            reason: None,
        }),
    )
}

//! Network Protocol Definitions
//!
//! HTTP contracts used to deliver tasks between farm members.

use super::types::{TaskEnvelope, TaskId};
use serde::{Deserialize, Serialize};

pub const ENDPOINT_DELIVER_TASK: &str = "/internal/farm/task";

#[derive(Debug, Serialize, Deserialize)]
pub struct DeliverTaskRequest {
    pub envelope: TaskEnvelope,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeliverTaskResponse {
    pub task_id: TaskId,
    pub accepted: bool,
    pub reason: Option<String>,
}

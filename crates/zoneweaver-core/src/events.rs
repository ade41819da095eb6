use serde::{Deserialize, Serialize};

/// Kind of change a `TaskEvent` reports, broadcast over the API server's
/// event bus for `GET /tasks` and `GET /vnc/sessions` watch streams.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskEventKind {
    Created,
    StatusChanged,
}

/// An event emitted whenever a Task is created or changes status.
/// Subscribers use this to drive SSE watch streams without re-polling
/// the persistence layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEvent {
    pub kind: TaskEventKind,
    pub task_id: String,
    pub zone_name: String,
    pub operation: String,
    pub status: String,
}

impl TaskEvent {
    pub fn created(task_id: impl Into<String>, zone_name: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            kind: TaskEventKind::Created,
            task_id: task_id.into(),
            zone_name: zone_name.into(),
            operation: operation.into(),
            status: "pending".to_string(),
        }
    }

    pub fn status_changed(
        task_id: impl Into<String>,
        zone_name: impl Into<String>,
        operation: impl Into<String>,
        status: impl Into<String>,
    ) -> Self {
        Self {
            kind: TaskEventKind::StatusChanged,
            task_id: task_id.into(),
            zone_name: zone_name.into(),
            operation: operation.into(),
            status: status.into(),
        }
    }
}

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;

/// API response wrapper
pub struct ApiResponse<T: Serialize> {
    status: StatusCode,
    body: T,
}

impl<T: Serialize> ApiResponse<T> {
    /// Create a new response with 200 OK
    pub fn ok(body: T) -> Self {
        Self { status: StatusCode::OK, body }
    }

    /// Create a new response with 201 Created
    pub fn created(body: T) -> Self {
        Self { status: StatusCode::CREATED, body }
    }

    /// Create a new response with custom status
    pub fn with_status(status: StatusCode, body: T) -> Self {
        Self { status, body }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

/// 202 Accepted body every mutating endpoint returns (§4.L, §6).
#[derive(Serialize)]
pub struct TaskAccepted {
    pub task_id: String,
    pub status: &'static str,
}

/// Build the 202-with-task-id response for a freshly submitted task, or the
/// 200-with-existing-task-id response when the same work is already queued.
pub fn task_accepted(task_id: impl Into<String>, already_queued: bool) -> Response {
    let status = if already_queued { StatusCode::OK } else { StatusCode::ACCEPTED };
    let task_id = task_id.into();
    (status, Json(TaskAccepted { task_id, status: if already_queued { "already_queued" } else { "queued" } })).into_response()
}

/// Plain `{success, message}` body used for operations the spec treats as
/// "success with a warning" rather than hard failures (§7).
pub fn status_success(message: impl Into<String>) -> Response {
    Json(json!({ "success": true, "message": message.into() })).into_response()
}

pub fn status_deleted(kind: &str, name: &str) -> Response {
    (StatusCode::OK, Json(json!({ "success": true, "message": format!("{} {} deleted", kind, name) }))).into_response()
}

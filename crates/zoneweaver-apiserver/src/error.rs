use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// API error type, shaped after the error-kind taxonomy every lower layer
/// (command result, DB error, PTY state) is translated into before a
/// handler returns (§7).
#[derive(Debug)]
pub enum ApiError {
    /// Bad input shape/values (400)
    Validation(String),

    /// Named entity missing (404)
    NotFound(String),

    /// Name exists / rule exists / session exists (409)
    Conflict(String),

    /// Zone not in the state an operation requires (400)
    Precondition(String),

    /// Command timeout/nonzero exit, proxy target unreachable (502)
    Upstream(String),

    /// No free port in range, retries exhausted (500)
    Capacity(String),

    /// DB write failure, panic, anything else unexpected (500)
    Internal(String),

    /// Orchestration (or another feature) is administratively disabled (503)
    Disabled(String),
}

/// Result type for API operations
pub type Result<T> = std::result::Result<T, ApiError>;

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Precondition(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Upstream(msg) => (StatusCode::BAD_GATEWAY, msg),
            ApiError::Capacity(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            ApiError::Disabled(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
        };

        let body = Json(json!({
            "error": status.canonical_reason().unwrap_or("error"),
            "details": message,
            "code": status.as_u16()
        }));

        (status, body).into_response()
    }
}

impl From<zoneweaver_core::ZoneweaverError> for ApiError {
    fn from(err: zoneweaver_core::ZoneweaverError) -> Self {
        use zoneweaver_core::ZoneweaverError;
        match err {
            ZoneweaverError::Validation { .. } => ApiError::Validation(err.to_string()),
            ZoneweaverError::NotFound { .. } => ApiError::NotFound(err.to_string()),
            ZoneweaverError::Conflict { .. } => ApiError::Conflict(err.to_string()),
            ZoneweaverError::Precondition { .. } => ApiError::Precondition(err.to_string()),
            ZoneweaverError::Upstream { .. } => ApiError::Upstream(err.to_string()),
            ZoneweaverError::Capacity { .. } => ApiError::Capacity(err.to_string()),
            ZoneweaverError::Internal { .. } => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<zoneweaver_storage::StorageError> for ApiError {
    fn from(err: zoneweaver_storage::StorageError) -> Self {
        use zoneweaver_storage::StorageError;
        match err {
            StorageError::KeyNotFound { .. } => ApiError::NotFound(err.to_string()),
            _ => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<zoneweaver_runtime::RuntimeError> for ApiError {
    fn from(err: zoneweaver_runtime::RuntimeError) -> Self {
        use zoneweaver_runtime::RuntimeError;
        match err {
            RuntimeError::ZoneNotFound { .. } | RuntimeError::ProcessNotFound { .. } => ApiError::NotFound(err.to_string()),
            RuntimeError::CommandTimeout { .. } | RuntimeError::CommandFailed { .. } | RuntimeError::NetworkError { .. } => {
                ApiError::Upstream(err.to_string())
            }
            RuntimeError::VncPortsExhausted { .. } => ApiError::Capacity(err.to_string()),
            RuntimeError::CoreError(e) => ApiError::from(e),
            RuntimeError::StorageError(e) => ApiError::from(e),
            _ => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<zoneweaver_task_engine::TaskEngineError> for ApiError {
    fn from(err: zoneweaver_task_engine::TaskEngineError) -> Self {
        use zoneweaver_task_engine::TaskEngineError;
        match err {
            TaskEngineError::TaskNotFound { .. } => ApiError::NotFound(err.to_string()),
            TaskEngineError::ClaimConflict { .. } => ApiError::Conflict(err.to_string()),
            TaskEngineError::StorageError(e) => ApiError::from(e),
            TaskEngineError::CoreError(e) => ApiError::from(e),
            TaskEngineError::RuntimeError(e) => ApiError::from(e),
            _ => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<zoneweaver_orchestrator::OrchestratorError> for ApiError {
    fn from(err: zoneweaver_orchestrator::OrchestratorError) -> Self {
        use zoneweaver_orchestrator::OrchestratorError;
        match err {
            OrchestratorError::StorageError(e) => ApiError::from(e),
            OrchestratorError::RuntimeError(e) => ApiError::from(e),
            OrchestratorError::TaskEngineError(e) => ApiError::from(e),
            OrchestratorError::SmfQueryFailed { .. } | OrchestratorError::SmfToggleFailed { .. } => ApiError::Upstream(err.to_string()),
            OrchestratorError::InternalError { .. } => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Validation(format!("invalid JSON body: {}", err))
    }
}

#![allow(unused_assignments)]

use miette::Diagnostic;
use thiserror::Error;

/// Zone Orchestrator error type
#[derive(Error, Debug, Diagnostic)]
pub enum OrchestratorError {
    /// Querying `svcs` for the zones service state failed or returned an
    /// unparseable result
    #[error("failed to query system/zones service state: {message}")]
    #[diagnostic(code(orchestrator::smf_query_failed), help("Check that svcs is on PATH and the zones FMRI exists"))]
    SmfQueryFailed { message: String },

    /// `svcadm enable`/`disable` against the zones service failed
    #[error("failed to toggle {service}: {message}")]
    #[diagnostic(code(orchestrator::smf_toggle_failed), help("The service may require pfexec privileges this process doesn't hold"))]
    SmfToggleFailed { service: String, message: String },

    /// Storage error
    #[error(transparent)]
    #[diagnostic(transparent)]
    StorageError(#[from] zoneweaver_storage::StorageError),

    /// Runtime error (command execution)
    #[error(transparent)]
    #[diagnostic(transparent)]
    RuntimeError(#[from] zoneweaver_runtime::RuntimeError),

    /// Task engine error (enqueueing start/stop tasks)
    #[error(transparent)]
    #[diagnostic(transparent)]
    TaskEngineError(#[from] zoneweaver_task_engine::TaskEngineError),

    /// Internal error
    #[error("Internal orchestrator error: {message}")]
    #[diagnostic(code(orchestrator::internal_error), help("This is likely a bug. Please report it with the full error details"))]
    InternalError { message: String },
}

/// Result type for orchestrator operations
pub type Result<T> = std::result::Result<T, OrchestratorError>;

impl OrchestratorError {
    pub fn smf_query_failed(message: impl Into<String>) -> Self {
        Self::SmfQueryFailed { message: message.into() }
    }

    pub fn smf_toggle_failed(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SmfToggleFailed {
            service: service.into(),
            message: message.into(),
        }
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::InternalError { message: message.into() }
    }
}

// Allow unused assignments for diagnostic fields - they're used by the macros
#![allow(unused_assignments)]

use miette::Diagnostic;
use thiserror::Error;

/// Task Engine error type
#[derive(Error, Debug, Diagnostic)]
pub enum TaskEngineError {
    /// Task not found
    #[error("Task not found: {task_id}")]
    #[diagnostic(code(task_engine::task_not_found), help("The task may have already completed and been purged"))]
    TaskNotFound {
        #[allow(unused)]
        task_id: String,
    },

    /// A task was claimed by another worker between the eligibility scan and the claim attempt
    #[error("Task {task_id} could not be claimed: {reason}")]
    #[diagnostic(code(task_engine::claim_conflict), help("This is expected under contention; the task will be reconsidered next tick"))]
    ClaimConflict {
        #[allow(unused)]
        task_id: String,
        #[allow(unused)]
        reason: String,
    },

    /// An operation handler does not exist for the given code
    #[error("No handler registered for operation {operation}")]
    #[diagnostic(code(task_engine::no_handler), help("This indicates a mismatch between the operation enum and the handler registry"))]
    NoHandler {
        #[allow(unused)]
        operation: String,
    },

    /// Handler metadata failed to decode
    #[error("Failed to decode metadata for task {task_id}: {message}")]
    #[diagnostic(code(task_engine::metadata_decode), help("Check the JSON shape expected by this operation's handler"))]
    MetadataDecode {
        #[allow(unused)]
        task_id: String,
        #[allow(unused)]
        message: String,
    },

    /// Storage error
    #[error(transparent)]
    #[diagnostic(transparent)]
    StorageError(#[from] zoneweaver_storage::StorageError),

    /// Core error
    #[error(transparent)]
    #[diagnostic(transparent)]
    CoreError(#[from] zoneweaver_core::ZoneweaverError),

    /// Runtime error (command execution, zone/zfs/network/pty/vnc)
    #[error(transparent)]
    #[diagnostic(transparent)]
    RuntimeError(#[from] zoneweaver_runtime::RuntimeError),

    /// Internal error
    #[error("Internal task engine error: {message}")]
    #[diagnostic(code(task_engine::internal_error), help("This is likely a bug. Please report it with the full error details"))]
    InternalError {
        #[allow(unused)]
        message: String,
    },
}

/// Result type for task engine operations
pub type Result<T> = std::result::Result<T, TaskEngineError>;

impl TaskEngineError {
    pub fn task_not_found(task_id: impl Into<String>) -> Self {
        Self::TaskNotFound { task_id: task_id.into() }
    }

    pub fn claim_conflict(task_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ClaimConflict {
            task_id: task_id.into(),
            reason: reason.into(),
        }
    }

    pub fn no_handler(operation: impl Into<String>) -> Self {
        Self::NoHandler { operation: operation.into() }
    }

    pub fn metadata_decode(task_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MetadataDecode {
            task_id: task_id.into(),
            message: message.into(),
        }
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::InternalError { message: message.into() }
    }
}

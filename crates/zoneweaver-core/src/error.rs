// Allow unused assignments for diagnostic fields - they're used by the macros
#![allow(unused_assignments)]

use miette::Diagnostic;
use thiserror::Error;

/// Cross-crate error type, one variant per error kind from the error
/// handling design (§7): Validation, NotFound, Conflict, Precondition,
/// Upstream, Capacity, Internal.
#[derive(Error, Debug, Diagnostic)]
pub enum ZoneweaverError {
    /// Bad input shape or values
    #[error("Validation failed: {details}")]
    #[diagnostic(code(zoneweaver::validation), help("{help_text}"))]
    Validation {
        #[allow(unused)]
        details: String,
        #[allow(unused)]
        help_text: String,
    },

    /// Named entity missing
    #[error("Not found: {what}")]
    #[diagnostic(code(zoneweaver::not_found), help("Verify the name and try again"))]
    NotFound {
        #[allow(unused)]
        what: String,
    },

    /// Name / rule / session already exists
    #[error("Conflict: {what}")]
    #[diagnostic(
        code(zoneweaver::conflict),
        help("Use a different name, or delete the existing entity first")
    )]
    Conflict {
        #[allow(unused)]
        what: String,
    },

    /// Zone not in the required state, or a dependency failed
    #[error("Precondition failed: {what}")]
    #[diagnostic(
        code(zoneweaver::precondition),
        help("Check the current zone/task state before retrying")
    )]
    Precondition {
        #[allow(unused)]
        what: String,
    },

    /// Command timeout/nonzero exit, or a proxy target unreachable
    #[error("Upstream failure: {what}")]
    #[diagnostic(
        code(zoneweaver::upstream),
        help("Check the underlying command or proxied service")
    )]
    Upstream {
        #[allow(unused)]
        what: String,
    },

    /// No free port/resource in range, or retries exhausted
    #[error("Capacity exceeded: {what}")]
    #[diagnostic(code(zoneweaver::capacity), help("Free up the exhausted resource and retry"))]
    Capacity {
        #[allow(unused)]
        what: String,
    },

    /// DB write failure, panic, or anything else unexpected
    #[error("Internal error: {message}")]
    #[diagnostic(
        code(zoneweaver::internal),
        help("This is likely a bug. Please report it with the full error details")
    )]
    Internal {
        #[allow(unused)]
        message: String,
    },
}

/// Result type alias for Zoneweaver operations
pub type Result<T> = std::result::Result<T, ZoneweaverError>;

impl ZoneweaverError {
    pub fn validation(details: impl Into<String>, help_text: impl Into<String>) -> Self {
        Self::Validation {
            details: details.into(),
            help_text: help_text.into(),
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    pub fn conflict(what: impl Into<String>) -> Self {
        Self::Conflict { what: what.into() }
    }

    pub fn precondition(what: impl Into<String>) -> Self {
        Self::Precondition { what: what.into() }
    }

    pub fn upstream(what: impl Into<String>) -> Self {
        Self::Upstream { what: what.into() }
    }

    pub fn capacity(what: impl Into<String>) -> Self {
        Self::Capacity { what: what.into() }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = ZoneweaverError::not_found("zone foo");
        assert!(matches!(err, ZoneweaverError::NotFound { .. }));

        let err = ZoneweaverError::validation("bad zone name", "must match the zone name pattern");
        assert!(matches!(err, ZoneweaverError::Validation { .. }));
    }
}

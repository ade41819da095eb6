use serde::{Deserialize, Serialize};

/// Result of one operation handler invocation (§4.E: "`handle(task) →
/// {success, message?, error?, artifact?}`"). Handlers never panic across
/// the dispatch boundary — a caught panic is folded into `error` by the
/// engine before this type is constructed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HandlerOutcome {
    pub success: bool,
    pub message: Option<String>,
    pub error: Option<String>,
    pub artifact: Option<String>,
    /// Whether a `failed` outcome should decrement `retries_left` and
    /// re-enter `pending` rather than going straight to `failed`.
    pub retryable: bool,
}

impl HandlerOutcome {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn ok_with_artifact(message: impl Into<String>, artifact: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            artifact: Some(artifact.into()),
            ..Default::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn retryable_failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            retryable: true,
            ..Default::default()
        }
    }
}

impl From<zoneweaver_runtime::RuntimeError> for HandlerOutcome {
    fn from(e: zoneweaver_runtime::RuntimeError) -> Self {
        HandlerOutcome::failed(e.to_string())
    }
}

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Who currently owns zone autoboot. Mirrors the `svcs` state of
/// `svc:/system/zones:default`: if it's `online`, the platform's own
/// service is driving autoboot; otherwise this orchestrator is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Controller {
    System,
    SelfManaged,
}

impl fmt::Display for Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Controller::System => "system/zones",
            Controller::SelfManaged => "self",
        };
        write!(f, "{}", s)
    }
}

/// What to do with later priority groups when an earlier shutdown group
/// contains a failed task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    Continue,
    Abort,
}

impl Default for FailurePolicy {
    fn default() -> Self {
        FailurePolicy::Continue
    }
}

/// Direction of a priority-grouped plan: startup groups run highest
/// priority first, shutdown groups run lowest priority first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Startup,
    Shutdown,
}

/// The single persisted row recording whether this host has taken over
/// autoboot from `system/zones`. Survives restarts via the config table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorState {
    pub enabled: bool,
}

impl Default for OrchestratorState {
    fn default() -> Self {
        Self { enabled: false }
    }
}

/// The row id under which `OrchestratorState` is stored; there is only
/// ever one.
pub const STATE_ID: &str = "default";

/// Process-local tuning, supplied at construction the same way
/// `EngineConfig` is for the task engine; not persisted.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Barrier between successive priority groups in a plan.
    pub priority_delay: Duration,
    /// What a shutdown plan does when an earlier group has a failed task.
    pub shutdown_failure_policy: FailurePolicy,
    /// How often the reconcile loop re-checks SMF drift.
    pub reconcile_interval: Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            priority_delay: Duration::from_secs(5),
            shutdown_failure_policy: FailurePolicy::Continue,
            reconcile_interval: Duration::from_secs(60),
        }
    }
}

//! Task Engine: the persisted, priority/dependency-aware dispatcher that
//! executes every zone/ZFS/network mutation in the system.
//!
//! - `engine` — the dispatch loop: eligibility scan, per-key exclusion,
//!   bounded worker pool, retry/cancel/dependency-cascade bookkeeping.
//! - `handlers` — one operation handler per closed operation code, calling
//!   straight into `zoneweaver-runtime`'s command wrappers.

pub mod engine;
pub mod error;
pub mod handlers;
pub mod types;

pub use engine::{Engine, EngineConfig};
pub use error::{Result, TaskEngineError};
pub use handlers::Handlers;
pub use types::HandlerOutcome;

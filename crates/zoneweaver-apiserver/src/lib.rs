//! Zoneweaver HTTP/WebSocket surface.
//!
//! - Axum-based REST server over zones, VNC sessions, recipes, ZFS
//!   pools/datasets, network rules, orchestration, and tasks.
//! - Every mutation is task-engine-mediated: handlers enqueue a `Task`
//!   and return 202 with its id rather than performing the operation
//!   inline.
//! - An SSE stream on `/tasks/watch` re-publishes the task engine's
//!   broadcast channel for clients that want to follow progress live.

pub mod error;
pub mod event_bus;
pub mod handlers;
pub mod response;
pub mod server;
pub mod state;
pub mod tls;
pub mod validation;
pub mod watch;

pub use error::{ApiError, Result};
pub use server::{ApiServer, Config};
pub use state::AppState;

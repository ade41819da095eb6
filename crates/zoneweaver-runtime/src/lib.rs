// Allow unused assignments for diagnostic fields - they're used by the thiserror/miette macros
#![allow(unused_assignments)]

pub mod command;
pub mod error;
pub mod mock;
pub mod network;
pub mod parsers;
pub mod pty;
pub mod recipe;
pub mod storage_pipeline;
pub mod supervisor;
pub mod vnc;
pub mod zfs_commands;
pub mod zone_commands;

pub use command::{CommandOutput, CommandRunner, RunOptions, SystemCommandRunner};
pub use error::{Result, RuntimeError};
pub use mock::MockCommandRunner;
pub use pty::{PtyMultiplexer, PtySession};
pub use recipe::RecipeInterpreter;
pub use storage_pipeline::StoragePipeline;
pub use supervisor::ProcessSupervisor;
pub use vnc::VncSupervisor;

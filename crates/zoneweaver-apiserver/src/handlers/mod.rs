pub mod common;
pub mod network;
pub mod orchestrator;
pub mod recipes;
pub mod storage;
pub mod tasks;
pub mod vnc;
pub mod zones;

pub use common::*;
pub use network::*;
pub use orchestrator::*;
pub use recipes::*;
pub use storage::*;
pub use tasks::*;
pub use vnc::*;
pub use zones::*;

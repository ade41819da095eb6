//! Zoneweaver Storage - storage abstraction and redb backend
//!
//! This crate provides:
//! - KVStore trait for storage abstraction
//! - redb-based implementation
//! - Key encoding for the flat `{table}/{id}` scheme
//! - A generic `Repository<T>` typed-table CRUD layer
//! - Transaction support

pub mod encoding;
pub mod error;
pub mod kv;
pub mod redb_backend;
pub mod repository;

// Re-export commonly used types
pub use encoding::KeyEncoder;
pub use error::{Result, StorageError};
pub use kv::{KVStore, Transaction};
pub use redb_backend::RedbBackend;
pub use repository::Repository;

//! Zoneweaver Core - shared data model and error types for the Zoneweaver
//! zone-and-storage control plane.
//!
//! This crate provides:
//! - The durable record types (Task, Zone, Recipe, VncSession, ...)
//! - The closed operation-code enum the Task Engine dispatches on
//! - A cross-crate error type with miette diagnostics
//! - Zone-name validation shared by the HTTP surface and the runtime

pub mod error;
pub mod events;
pub mod types;

pub use error::{Result, ZoneweaverError};
pub use events::{TaskEvent, TaskEventKind};
pub use types::*;

/// Validate a zone name per the HTTP surface's contract (§4.L):
/// `^[A-Za-z0-9][A-Za-z0-9._-]*[A-Za-z0-9]$|^[A-Za-z0-9]$`, length <= 64.
pub fn is_valid_zone_name(name: &str) -> bool {
    if name.is_empty() || name.len() > 64 {
        return false;
    }

    let bytes = name.as_bytes();
    let is_word = |b: u8| b.is_ascii_alphanumeric();
    let is_body = |b: u8| b.is_ascii_alphanumeric() || b == b'.' || b == b'_' || b == b'-';

    if bytes.len() == 1 {
        return is_word(bytes[0]);
    }

    is_word(bytes[0]) && is_word(bytes[bytes.len() - 1]) && bytes[1..bytes.len() - 1].iter().all(|&b| is_body(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_zone_names() {
        assert!(is_valid_zone_name("a"));
        assert!(is_valid_zone_name("web01"));
        assert!(is_valid_zone_name("web-01.prod"));
        assert!(is_valid_zone_name("a_b"));
    }

    #[test]
    fn test_invalid_zone_names() {
        assert!(!is_valid_zone_name(""));
        assert!(!is_valid_zone_name("-leading-dash"));
        assert!(!is_valid_zone_name("trailing-dash-"));
        assert!(!is_valid_zone_name(&"a".repeat(65)));
    }
}

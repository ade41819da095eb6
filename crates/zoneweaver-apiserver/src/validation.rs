use crate::{ApiError, Result};
use zoneweaver_core::is_valid_zone_name;

/// Validate a zone name against `^[A-Za-z0-9][A-Za-z0-9._-]*[A-Za-z0-9]$|^[A-Za-z0-9]$`, length <= 64.
pub fn validate_zone_name(name: &str) -> Result<()> {
    if !is_valid_zone_name(name) {
        return Err(ApiError::Validation(format!(
            "invalid zone name: {name} (must match ^[A-Za-z0-9][A-Za-z0-9._-]*[A-Za-z0-9]$|^[A-Za-z0-9]$, length <= 64)"
        )));
    }
    Ok(())
}

/// ZFS pool/dataset names: non-empty, no whitespace, no leading slash.
pub fn validate_pool_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains(char::is_whitespace) || name.starts_with('/') {
        return Err(ApiError::Validation(format!("invalid pool name: {name}")));
    }
    Ok(())
}

pub fn validate_dataset_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains(char::is_whitespace) {
        return Err(ApiError::Validation(format!("invalid dataset name: {name}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_zone_name_accepts_valid() {
        assert!(validate_zone_name("web01").is_ok());
        assert!(validate_zone_name("a").is_ok());
        assert!(validate_zone_name("my.zone-1").is_ok());
    }

    #[test]
    fn test_validate_zone_name_rejects_invalid() {
        assert!(validate_zone_name("").is_err());
        assert!(validate_zone_name("-leading").is_err());
        assert!(validate_zone_name(&"a".repeat(65)).is_err());
    }

    #[test]
    fn test_validate_pool_name() {
        assert!(validate_pool_name("tank").is_ok());
        assert!(validate_pool_name("").is_err());
        assert!(validate_pool_name("/tank").is_err());
        assert!(validate_pool_name("tank one").is_err());
    }

    #[test]
    fn test_validate_dataset_name() {
        assert!(validate_dataset_name("tank/data").is_ok());
        assert!(validate_dataset_name("").is_err());
    }
}

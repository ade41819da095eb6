/// Key encoder for the single flat `records` table. Every repository
/// row is stored under `{table}/{id}`, which makes a table's full
/// contents a prefix scan and keeps natural identifiers (zone name,
/// task id, hostname, ...) visible in the key for debugging.
pub struct KeyEncoder;

impl KeyEncoder {
    /// Encode the storage key for one row.
    pub fn encode(table: &str, id: &str) -> String {
        format!("{}/{}", table, id)
    }

    /// Encode the prefix that scans every row of a table.
    pub fn encode_prefix(table: &str) -> String {
        format!("{}/", table)
    }

    /// Split a storage key back into its table and id, for diagnostics.
    pub fn parse_key(key: &str) -> Option<(&str, &str)> {
        key.split_once('/')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_and_prefix() {
        assert_eq!(KeyEncoder::encode("tasks", "abc-123"), "tasks/abc-123");
        assert_eq!(KeyEncoder::encode_prefix("tasks"), "tasks/");
        assert!(KeyEncoder::encode("tasks", "abc-123").starts_with(&KeyEncoder::encode_prefix("tasks")));
    }

    #[test]
    fn test_parse_key() {
        assert_eq!(KeyEncoder::parse_key("tasks/abc-123"), Some(("tasks", "abc-123")));
        assert_eq!(KeyEncoder::parse_key("zones/web01/extra"), Some(("zones", "web01/extra")));
        assert_eq!(KeyEncoder::parse_key("no-slash"), None);
    }
}

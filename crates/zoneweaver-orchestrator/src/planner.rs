//! Priority-grouped start/stop planning. Zones sharing a priority form
//! one group and run fully in parallel (by enqueueing every member's
//! task before the group's barrier); groups are ordered descending for
//! startup, ascending for shutdown.

use crate::types::Direction;
use std::collections::BTreeMap;

/// Group `(zone_name, priority)` pairs by priority and order the groups
/// for the given direction. Groups are sorted by priority; `Startup`
/// reverses them so the highest priority starts first.
pub fn group_by_priority(zones: &[(String, u32)], direction: Direction) -> Vec<(u32, Vec<String>)> {
    let mut groups: BTreeMap<u32, Vec<String>> = BTreeMap::new();
    for (name, priority) in zones {
        groups.entry(*priority).or_default().push(name.clone());
    }
    let mut ordered: Vec<(u32, Vec<String>)> = groups.into_iter().collect();
    if direction == Direction::Startup {
        ordered.reverse();
    }
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zones(pairs: &[(&str, u32)]) -> Vec<(String, u32)> {
        pairs.iter().map(|(n, p)| (n.to_string(), *p)).collect()
    }

    #[test]
    fn test_startup_orders_highest_priority_first() {
        let z = zones(&[("a", 10), ("b", 50), ("c", 50), ("d", 90)]);
        let groups = group_by_priority(&z, Direction::Startup);
        let priorities: Vec<u32> = groups.iter().map(|(p, _)| *p).collect();
        assert_eq!(priorities, vec![90, 50, 10]);
        assert_eq!(groups[1].1.len(), 2);
    }

    #[test]
    fn test_shutdown_orders_lowest_priority_first() {
        let z = zones(&[("a", 10), ("b", 50), ("d", 90)]);
        let groups = group_by_priority(&z, Direction::Shutdown);
        let priorities: Vec<u32> = groups.iter().map(|(p, _)| *p).collect();
        assert_eq!(priorities, vec![10, 50, 90]);
    }

    #[test]
    fn test_empty_input_yields_no_groups() {
        let groups = group_by_priority(&[], Direction::Startup);
        assert!(groups.is_empty());
    }
}

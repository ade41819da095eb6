//! The HTTP layer doesn't own an event bus of its own — it shares the Task
//! Engine's `broadcast::Sender<TaskEvent>` (handed to [`crate::AppState`] at
//! construction) so a task created by the orchestrator or the scheduler tick
//! shows up on the same watch stream as one created by a handler.

pub use zoneweaver_core::{TaskEvent, TaskEventKind};

/// Capacity for the shared `TaskEvent` broadcast channel.
#[derive(Debug, Clone)]
pub struct EventBusConfig {
    pub capacity: usize,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self { capacity: 4096 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_bus_config_default() {
        assert_eq!(EventBusConfig::default().capacity, 4096);
    }
}

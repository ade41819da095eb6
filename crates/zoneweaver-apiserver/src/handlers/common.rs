//! Shared submit-or-reuse helper every mutating handler routes through.
//! Mirrors the "read, mutate, publish" shape used throughout the codebase,
//! minus any versioned-commit bookkeeping: `Repository<Task>` already is
//! the durable log, and the Task Engine already publishes the `TaskEvent`.

use crate::error::Result;
use crate::response::task_accepted;
use axum::response::Response;
use serde::Serialize;
use zoneweaver_core::{OperationCode, Task, TaskPriority, TaskStatus};
use zoneweaver_runtime::command::CommandRunner;
use zoneweaver_storage::Repository;
use zoneweaver_task_engine::Engine;

/// Submit a task for `zone_name`/`operation`, or, if an identical task
/// (same zone, operation, and metadata) is already `pending`/`running`,
/// return that one's id with a 200 instead of enqueueing a duplicate
/// (§4.L "operation already queued").
pub fn submit_or_reuse<R, M>(
    tasks: &Repository<Task>,
    engine: &Engine<R>,
    zone_name: &str,
    operation: OperationCode,
    priority: TaskPriority,
    created_by: &str,
    metadata: &M,
) -> Result<Response>
where
    R: CommandRunner + Send + Sync + 'static,
    M: Serialize,
{
    let metadata_str = serde_json::to_string(metadata)?;

    let existing = tasks.find_all_by(
        |t| {
            t.zone_name == zone_name
                && t.operation == operation
                && matches!(t.status, TaskStatus::Pending | TaskStatus::Running)
                && t.metadata == metadata_str
        },
        None::<fn(&Task, &Task) -> std::cmp::Ordering>,
        Some(1),
    )?;

    if let Some(existing) = existing.into_iter().next() {
        return Ok(task_accepted(existing.id, true));
    }

    let task = Task::new(zone_name, operation, priority, created_by, metadata_str);
    engine.submit(&task)?;
    Ok(task_accepted(task.id, false))
}

//! `/tasks/*` — read-only task inspection plus pending-task cancellation.

use crate::state::AppState;
use crate::{ApiError, Result};
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use zoneweaver_core::{Task, TaskStatus};
use zoneweaver_runtime::command::CommandRunner;

#[derive(Deserialize, Default)]
pub struct TaskListQuery {
    pub status: Option<String>,
    pub operation: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

pub async fn list_tasks<R: CommandRunner + Clone + Send + Sync + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Query(q): Query<TaskListQuery>,
) -> Result<Json<Vec<Task>>> {
    let status_filter = q.status.as_deref();
    let op_filter = q.operation.as_deref();

    let mut tasks = state.tasks.find_all_by(
        |t| {
            status_filter.map(|s| t.status.to_string() == s).unwrap_or(true)
                && op_filter.map(|o| t.operation.as_str() == o).unwrap_or(true)
        },
        Some(|a: &Task, b: &Task| b.created_at.cmp(&a.created_at)),
        None,
    )?;

    let offset = q.offset.unwrap_or(0);
    if offset > 0 {
        tasks = tasks.into_iter().skip(offset).collect();
    }
    if let Some(limit) = q.limit {
        tasks.truncate(limit);
    }
    Ok(Json(tasks))
}

pub async fn get_task<R: CommandRunner + Clone + Send + Sync + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Path(task_id): Path<String>,
) -> Result<Json<Task>> {
    state
        .tasks
        .find_by_id(&task_id)?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("task not found: {task_id}")))
}

#[derive(Serialize)]
pub struct TaskStats {
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

pub async fn task_stats<R: CommandRunner + Clone + Send + Sync + 'static>(
    State(state): State<Arc<AppState<R>>>,
) -> Result<Json<TaskStats>> {
    let tasks = state.tasks.find_all()?;
    let mut stats = TaskStats { pending: 0, running: 0, completed: 0, failed: 0, cancelled: 0 };
    for t in &tasks {
        match t.status {
            TaskStatus::Pending => stats.pending += 1,
            TaskStatus::Running => stats.running += 1,
            TaskStatus::Completed => stats.completed += 1,
            TaskStatus::Failed => stats.failed += 1,
            TaskStatus::Cancelled => stats.cancelled += 1,
        }
    }
    Ok(Json(stats))
}

pub async fn cancel_task<R: CommandRunner + Clone + Send + Sync + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Path(task_id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    state.engine.cancel(&task_id).await?;
    Ok(Json(serde_json::json!({ "success": true })))
}

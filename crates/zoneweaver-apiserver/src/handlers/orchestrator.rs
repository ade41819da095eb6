//! `/zones/orchestration/*` — autoboot takeover status, enable, disable,
//! and a read-only "test" view of the current priority plan.

use crate::state::AppState;
use crate::Result;
use axum::extract::State;
use axum::Json;
use serde::Serialize;
use std::sync::Arc;
use zoneweaver_core::ZoneConfigSummary;
use zoneweaver_orchestrator::planner::group_by_priority;
use zoneweaver_orchestrator::{Controller, Direction};
use zoneweaver_runtime::command::CommandRunner;

#[derive(Serialize)]
pub struct OrchestrationStatus {
    pub controller: Controller,
}

pub async fn status<R: CommandRunner + Clone + Send + Sync + 'static>(
    State(state): State<Arc<AppState<R>>>,
) -> Result<Json<OrchestrationStatus>> {
    let controller = state.orchestrator.query_controller().await?;
    Ok(Json(OrchestrationStatus { controller }))
}

#[derive(Serialize)]
pub struct EnableResult {
    pub task_ids: Vec<String>,
}

pub async fn enable<R: CommandRunner + Clone + Send + Sync + 'static>(
    State(state): State<Arc<AppState<R>>>,
) -> Result<Json<EnableResult>> {
    let task_ids = state.orchestrator.enable("api").await?;
    Ok(Json(EnableResult { task_ids }))
}

pub async fn disable<R: CommandRunner + Clone + Send + Sync + 'static>(
    State(state): State<Arc<AppState<R>>>,
) -> Result<Json<serde_json::Value>> {
    state.orchestrator.disable().await?;
    Ok(Json(serde_json::json!({ "success": true })))
}

#[derive(Serialize)]
pub struct PlanPreview {
    pub controller: Controller,
    pub startup_groups: Vec<(u32, Vec<String>)>,
    pub shutdown_groups: Vec<(u32, Vec<String>)>,
}

/// Dry-run: report the current controller and what the priority plan
/// would look like without enqueueing anything.
pub async fn test<R: CommandRunner + Clone + Send + Sync + 'static>(
    State(state): State<Arc<AppState<R>>>,
) -> Result<Json<PlanPreview>> {
    let controller = state.orchestrator.query_controller().await?;
    let zones = state.zones.find_all()?;
    let tagged: Vec<(String, u32)> = zones
        .iter()
        .map(|z| {
            let priority = serde_json::from_str::<ZoneConfigSummary>(&z.configuration).map(|s| s.priority).unwrap_or(50);
            (z.name.clone(), priority)
        })
        .collect();
    let startup_groups = group_by_priority(&tagged, Direction::Startup);
    let shutdown_groups = group_by_priority(&tagged, Direction::Shutdown);
    Ok(Json(PlanPreview { controller, startup_groups, shutdown_groups }))
}

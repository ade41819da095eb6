//! Zone lifecycle endpoints: list/get/config, start/stop/restart/delete
//! (all task-engine-mediated mutations), and the priorities view the
//! orchestrator's planner consumes.

use crate::handlers::common::submit_or_reuse;
use crate::state::AppState;
use crate::validation::validate_zone_name;
use crate::{ApiError, Result};
use axum::extract::{Path, Query, State};
use axum::response::Response;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use zoneweaver_core::{OperationCode, TaskPriority, Zone, ZoneConfigSummary};
use zoneweaver_runtime::command::CommandRunner;

#[derive(Deserialize)]
pub struct ForceQuery {
    #[serde(default)]
    pub force: bool,
}

pub async fn list_zones<R: CommandRunner + Clone + Send + Sync + 'static>(
    State(state): State<Arc<AppState<R>>>,
) -> Result<Json<Vec<Zone>>> {
    Ok(Json(state.zones.find_all()?))
}

pub async fn get_zone<R: CommandRunner + Clone + Send + Sync + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Path(zone_name): Path<String>,
) -> Result<Json<Zone>> {
    validate_zone_name(&zone_name)?;
    state
        .zones
        .find_by_id(&zone_name)?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("zone not found: {zone_name}")))
}

pub async fn get_zone_config<R: CommandRunner + Clone + Send + Sync + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Path(zone_name): Path<String>,
) -> Result<Json<ZoneConfigSummary>> {
    validate_zone_name(&zone_name)?;
    let zone = state
        .zones
        .find_by_id(&zone_name)?
        .ok_or_else(|| ApiError::NotFound(format!("zone not found: {zone_name}")))?;
    let summary: ZoneConfigSummary = serde_json::from_str(&zone.configuration)
        .map_err(|e| ApiError::Internal(format!("stored configuration for {zone_name} is not valid: {e}")))?;
    Ok(Json(summary))
}

#[derive(Serialize)]
pub struct ZonePriority {
    pub zone_name: String,
    pub priority: u32,
}

pub async fn list_priorities<R: CommandRunner + Clone + Send + Sync + 'static>(
    State(state): State<Arc<AppState<R>>>,
) -> Result<Json<Vec<ZonePriority>>> {
    let zones = state.zones.find_all()?;
    let mut priorities: Vec<ZonePriority> = zones
        .into_iter()
        .map(|z| {
            let priority = serde_json::from_str::<ZoneConfigSummary>(&z.configuration).map(|s| s.priority).unwrap_or(50);
            ZonePriority { zone_name: z.name, priority }
        })
        .collect();
    priorities.sort_by(|a, b| b.priority.cmp(&a.priority));
    Ok(Json(priorities))
}

async fn mutate<R: CommandRunner + Clone + Send + Sync + 'static>(
    state: &AppState<R>,
    zone_name: &str,
    operation: OperationCode,
) -> Result<Response> {
    validate_zone_name(zone_name)?;
    if state.zones.find_by_id(zone_name)?.is_none() {
        return Err(ApiError::NotFound(format!("zone not found: {zone_name}")));
    }
    submit_or_reuse(&state.tasks, &state.engine, zone_name, operation, TaskPriority::Medium, "api", &serde_json::json!({}))
}

pub async fn start_zone<R: CommandRunner + Clone + Send + Sync + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Path(zone_name): Path<String>,
) -> Result<Response> {
    mutate(&state, &zone_name, OperationCode::Start).await
}

pub async fn stop_zone<R: CommandRunner + Clone + Send + Sync + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Path(zone_name): Path<String>,
) -> Result<Response> {
    mutate(&state, &zone_name, OperationCode::Stop).await
}

pub async fn restart_zone<R: CommandRunner + Clone + Send + Sync + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Path(zone_name): Path<String>,
) -> Result<Response> {
    mutate(&state, &zone_name, OperationCode::Restart).await
}

pub async fn delete_zone<R: CommandRunner + Clone + Send + Sync + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Path(zone_name): Path<String>,
    Query(_force): Query<ForceQuery>,
) -> Result<Response> {
    validate_zone_name(&zone_name)?;
    if state.zones.find_by_id(&zone_name)?.is_none() {
        return Err(ApiError::NotFound(format!("zone not found: {zone_name}")));
    }
    submit_or_reuse(
        &state.tasks,
        &state.engine,
        &zone_name,
        OperationCode::Delete,
        TaskPriority::Medium,
        "api",
        &serde_json::json!({}),
    )
}

//! `/storage/pools/*` and `/zfs/datasets/*` — zpool and ZFS dataset CRUD.
//! Every mutation is a task targeting the `"system"` pseudo-zone; reads go
//! straight through the storage pipeline's persisted snapshot.

use crate::handlers::common::submit_or_reuse;
use crate::state::AppState;
use crate::{ApiError, Result};
use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use zoneweaver_core::{OperationCode, TaskPriority, ZfsDatasetRecord, ZfsPoolRecord};
use zoneweaver_runtime::command::CommandRunner;

const SYSTEM_ZONE: &str = "system";

pub async fn list_pools<R: CommandRunner + Clone + Send + Sync + 'static>(
    State(state): State<Arc<AppState<R>>>,
) -> Result<Json<Vec<ZfsPoolRecord>>> {
    Ok(Json(state.zpools.find_all()?))
}

pub async fn get_pool<R: CommandRunner + Clone + Send + Sync + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Path(pool): Path<String>,
) -> Result<Json<ZfsPoolRecord>> {
    state.zpools.find_by_id(&pool)?.map(Json).ok_or_else(|| ApiError::NotFound(format!("pool not found: {pool}")))
}

pub async fn list_datasets<R: CommandRunner + Clone + Send + Sync + 'static>(
    State(state): State<Arc<AppState<R>>>,
) -> Result<Json<Vec<ZfsDatasetRecord>>> {
    Ok(Json(state.datasets.find_all()?))
}

pub async fn get_dataset<R: CommandRunner + Clone + Send + Sync + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Path(dataset): Path<String>,
) -> Result<Json<ZfsDatasetRecord>> {
    state.datasets.find_by_id(&dataset)?.map(Json).ok_or_else(|| ApiError::NotFound(format!("dataset not found: {dataset}")))
}

#[derive(Deserialize)]
pub struct CreatePool {
    pub pool: String,
    pub vdev_args: Vec<String>,
}

pub async fn create_pool<R: CommandRunner + Clone + Send + Sync + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Json(body): Json<CreatePool>,
) -> Result<Response> {
    submit_or_reuse(&state.tasks, &state.engine, SYSTEM_ZONE, OperationCode::ZpoolCreate, TaskPriority::Medium, "api", &body)
}

#[derive(Deserialize, Default)]
pub struct DestroyPoolQuery {
    #[serde(default)]
    pub force: bool,
}

pub async fn destroy_pool<R: CommandRunner + Clone + Send + Sync + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Path(pool): Path<String>,
    axum::extract::Query(q): axum::extract::Query<DestroyPoolQuery>,
) -> Result<Response> {
    submit_or_reuse(
        &state.tasks,
        &state.engine,
        SYSTEM_ZONE,
        OperationCode::ZpoolDestroy,
        TaskPriority::High,
        "api",
        &serde_json::json!({ "pool": pool, "force": q.force }),
    )
}

#[derive(Deserialize)]
pub struct SetProperties {
    pub properties: HashMap<String, String>,
}

pub async fn set_pool_properties<R: CommandRunner + Clone + Send + Sync + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Path(pool): Path<String>,
    Json(body): Json<SetProperties>,
) -> Result<Response> {
    submit_or_reuse(
        &state.tasks,
        &state.engine,
        SYSTEM_ZONE,
        OperationCode::ZpoolSetProperties,
        TaskPriority::Medium,
        "api",
        &serde_json::json!({ "pool": pool, "properties": body.properties }),
    )
}

#[derive(Deserialize)]
pub struct VdevArgs {
    pub vdev_args: Vec<String>,
}

pub async fn add_vdev<R: CommandRunner + Clone + Send + Sync + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Path(pool): Path<String>,
    Json(body): Json<VdevArgs>,
) -> Result<Response> {
    submit_or_reuse(
        &state.tasks,
        &state.engine,
        SYSTEM_ZONE,
        OperationCode::ZpoolAddVdev,
        TaskPriority::Medium,
        "api",
        &serde_json::json!({ "pool": pool, "vdev_args": body.vdev_args }),
    )
}

#[derive(Deserialize)]
pub struct DeviceName {
    pub device: String,
}

pub async fn remove_vdev<R: CommandRunner + Clone + Send + Sync + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Path(pool): Path<String>,
    Json(body): Json<DeviceName>,
) -> Result<Response> {
    submit_or_reuse(
        &state.tasks,
        &state.engine,
        SYSTEM_ZONE,
        OperationCode::ZpoolRemoveVdev,
        TaskPriority::Medium,
        "api",
        &serde_json::json!({ "pool": pool, "device": body.device }),
    )
}

#[derive(Deserialize)]
pub struct ReplaceDevice {
    pub old: String,
    pub new: String,
}

pub async fn replace_device<R: CommandRunner + Clone + Send + Sync + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Path(pool): Path<String>,
    Json(body): Json<ReplaceDevice>,
) -> Result<Response> {
    submit_or_reuse(
        &state.tasks,
        &state.engine,
        SYSTEM_ZONE,
        OperationCode::ZpoolReplaceDevice,
        TaskPriority::High,
        "api",
        &serde_json::json!({ "pool": pool, "old": body.old, "new": body.new }),
    )
}

async fn one_device<R: CommandRunner + Clone + Send + Sync + 'static>(
    state: &AppState<R>,
    pool: String,
    device: String,
    operation: OperationCode,
) -> Result<Response> {
    submit_or_reuse(
        &state.tasks,
        &state.engine,
        SYSTEM_ZONE,
        operation,
        TaskPriority::Medium,
        "api",
        &serde_json::json!({ "pool": pool, "device": device }),
    )
}

pub async fn online_device<R: CommandRunner + Clone + Send + Sync + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Path((pool, device)): Path<(String, String)>,
) -> Result<Response> {
    one_device(&state, pool, device, OperationCode::ZpoolOnlineDevice).await
}

pub async fn offline_device<R: CommandRunner + Clone + Send + Sync + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Path((pool, device)): Path<(String, String)>,
) -> Result<Response> {
    one_device(&state, pool, device, OperationCode::ZpoolOfflineDevice).await
}

async fn pool_name_op<R: CommandRunner + Clone + Send + Sync + 'static>(
    state: &AppState<R>,
    pool: String,
    operation: OperationCode,
    priority: TaskPriority,
) -> Result<Response> {
    submit_or_reuse(&state.tasks, &state.engine, SYSTEM_ZONE, operation, priority, "api", &serde_json::json!({ "pool": pool }))
}

pub async fn scrub_pool<R: CommandRunner + Clone + Send + Sync + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Path(pool): Path<String>,
) -> Result<Response> {
    pool_name_op(&state, pool, OperationCode::ZpoolScrub, TaskPriority::Low).await
}

pub async fn stop_scrub<R: CommandRunner + Clone + Send + Sync + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Path(pool): Path<String>,
) -> Result<Response> {
    pool_name_op(&state, pool, OperationCode::ZpoolStopScrub, TaskPriority::Low).await
}

pub async fn export_pool<R: CommandRunner + Clone + Send + Sync + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Path(pool): Path<String>,
) -> Result<Response> {
    pool_name_op(&state, pool, OperationCode::ZpoolExport, TaskPriority::High).await
}

pub async fn import_pool<R: CommandRunner + Clone + Send + Sync + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Path(pool): Path<String>,
) -> Result<Response> {
    pool_name_op(&state, pool, OperationCode::ZpoolImport, TaskPriority::High).await
}

pub async fn upgrade_pool<R: CommandRunner + Clone + Send + Sync + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Path(pool): Path<String>,
) -> Result<Response> {
    pool_name_op(&state, pool, OperationCode::ZpoolUpgrade, TaskPriority::Low).await
}

// --- ZFS datasets ---------------------------------------------------

#[derive(Deserialize)]
pub struct CreateDataset {
    pub dataset: String,
    #[serde(default)]
    pub properties: HashMap<String, String>,
}

pub async fn create_dataset<R: CommandRunner + Clone + Send + Sync + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Json(body): Json<CreateDataset>,
) -> Result<Response> {
    submit_or_reuse(&state.tasks, &state.engine, SYSTEM_ZONE, OperationCode::ZfsCreateDataset, TaskPriority::Medium, "api", &body)
}

#[derive(Deserialize, Default)]
pub struct DestroyDatasetQuery {
    #[serde(default)]
    pub recursive: bool,
}

pub async fn destroy_dataset<R: CommandRunner + Clone + Send + Sync + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Path(dataset): Path<String>,
    axum::extract::Query(q): axum::extract::Query<DestroyDatasetQuery>,
) -> Result<Response> {
    submit_or_reuse(
        &state.tasks,
        &state.engine,
        SYSTEM_ZONE,
        OperationCode::ZfsDestroyDataset,
        TaskPriority::High,
        "api",
        &serde_json::json!({ "dataset": dataset, "recursive": q.recursive }),
    )
}

pub async fn set_dataset_properties<R: CommandRunner + Clone + Send + Sync + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Path(dataset): Path<String>,
    Json(body): Json<SetProperties>,
) -> Result<Response> {
    submit_or_reuse(
        &state.tasks,
        &state.engine,
        SYSTEM_ZONE,
        OperationCode::ZfsSetProperties,
        TaskPriority::Medium,
        "api",
        &serde_json::json!({ "dataset": dataset, "properties": body.properties }),
    )
}

pub async fn promote_dataset<R: CommandRunner + Clone + Send + Sync + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Path(dataset): Path<String>,
) -> Result<Response> {
    submit_or_reuse(
        &state.tasks,
        &state.engine,
        SYSTEM_ZONE,
        OperationCode::ZfsPromoteDataset,
        TaskPriority::Medium,
        "api",
        &serde_json::json!({ "dataset": dataset }),
    )
}

#[derive(Deserialize)]
pub struct RenameDataset {
    pub new_name: String,
}

pub async fn rename_dataset<R: CommandRunner + Clone + Send + Sync + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Path(dataset): Path<String>,
    Json(body): Json<RenameDataset>,
) -> Result<Response> {
    submit_or_reuse(
        &state.tasks,
        &state.engine,
        SYSTEM_ZONE,
        OperationCode::ZfsRenameDataset,
        TaskPriority::Medium,
        "api",
        &serde_json::json!({ "dataset": dataset, "new_name": body.new_name }),
    )
}

#[derive(Deserialize)]
pub struct CloneDataset {
    pub snapshot: String,
    pub target: String,
}

pub async fn clone_dataset<R: CommandRunner + Clone + Send + Sync + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Json(body): Json<CloneDataset>,
) -> Result<Response> {
    submit_or_reuse(&state.tasks, &state.engine, SYSTEM_ZONE, OperationCode::ZfsCloneDataset, TaskPriority::Medium, "api", &body)
}

#[derive(Deserialize)]
pub struct SnapshotName {
    pub snapshot: String,
}

pub async fn create_snapshot<R: CommandRunner + Clone + Send + Sync + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Path(dataset): Path<String>,
    Json(body): Json<SnapshotName>,
) -> Result<Response> {
    submit_or_reuse(
        &state.tasks,
        &state.engine,
        SYSTEM_ZONE,
        OperationCode::ZfsCreateSnapshot,
        TaskPriority::Medium,
        "api",
        &serde_json::json!({ "dataset": dataset, "snapshot": body.snapshot }),
    )
}

pub async fn destroy_snapshot<R: CommandRunner + Clone + Send + Sync + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Path((dataset, snapshot)): Path<(String, String)>,
) -> Result<Response> {
    submit_or_reuse(
        &state.tasks,
        &state.engine,
        SYSTEM_ZONE,
        OperationCode::ZfsDestroySnapshot,
        TaskPriority::Medium,
        "api",
        &serde_json::json!({ "dataset": dataset, "snapshot": snapshot }),
    )
}

pub async fn rollback_snapshot<R: CommandRunner + Clone + Send + Sync + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Path((dataset, snapshot)): Path<(String, String)>,
) -> Result<Response> {
    submit_or_reuse(
        &state.tasks,
        &state.engine,
        SYSTEM_ZONE,
        OperationCode::ZfsRollbackSnapshot,
        TaskPriority::High,
        "api",
        &serde_json::json!({ "dataset": dataset, "snapshot": snapshot }),
    )
}

#[derive(Deserialize)]
pub struct SnapshotHoldRequest {
    pub tag: String,
}

pub async fn hold_snapshot<R: CommandRunner + Clone + Send + Sync + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Path((dataset, snapshot)): Path<(String, String)>,
    Json(body): Json<SnapshotHoldRequest>,
) -> Result<Response> {
    submit_or_reuse(
        &state.tasks,
        &state.engine,
        SYSTEM_ZONE,
        OperationCode::ZfsHoldSnapshot,
        TaskPriority::Low,
        "api",
        &serde_json::json!({ "dataset": dataset, "snapshot": snapshot, "tag": body.tag }),
    )
}

pub async fn release_snapshot<R: CommandRunner + Clone + Send + Sync + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Path((dataset, snapshot)): Path<(String, String)>,
    Json(body): Json<SnapshotHoldRequest>,
) -> Result<Response> {
    submit_or_reuse(
        &state.tasks,
        &state.engine,
        SYSTEM_ZONE,
        OperationCode::ZfsReleaseSnapshot,
        TaskPriority::Low,
        "api",
        &serde_json::json!({ "dataset": dataset, "snapshot": snapshot, "tag": body.tag }),
    )
}

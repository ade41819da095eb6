//! `/network/*` — NAT rule CRUD, ipfilter forwarding toggles, and DHCP
//! subnet/host/service routes. All of these run through the task engine
//! against the `"system"` pseudo-zone.

use crate::handlers::common::submit_or_reuse;
use crate::state::AppState;
use crate::{ApiError, Result};
use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use zoneweaver_core::{NatRule, NatRuleType, OperationCode, TaskPriority};
use zoneweaver_runtime::command::CommandRunner;

const SYSTEM_ZONE: &str = "system";

pub async fn list_nat_rules<R: CommandRunner + Clone + Send + Sync + 'static>(
    State(state): State<Arc<AppState<R>>>,
) -> Result<Json<Vec<NatRule>>> {
    Ok(Json(state.nat_rules.find_all()?))
}

pub async fn get_nat_rule<R: CommandRunner + Clone + Send + Sync + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Path(id): Path<String>,
) -> Result<Json<NatRule>> {
    state.nat_rules.find_by_id(&id)?.map(Json).ok_or_else(|| ApiError::NotFound(format!("NAT rule not found: {id}")))
}

#[derive(Deserialize, Serialize)]
pub struct CreateNatRule {
    pub rule_type: NatRuleType,
    pub bridge: String,
    pub subnet: String,
    pub target: String,
    pub protocol: String,
    #[serde(default)]
    pub description: Option<String>,
}

pub async fn create_nat_rule<R: CommandRunner + Clone + Send + Sync + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Json(body): Json<CreateNatRule>,
) -> Result<Response> {
    submit_or_reuse(&state.tasks, &state.engine, SYSTEM_ZONE, OperationCode::NatCreate, TaskPriority::Medium, "api", &body)
}

pub async fn delete_nat_rule<R: CommandRunner + Clone + Send + Sync + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Path(id): Path<String>,
) -> Result<Response> {
    if state.nat_rules.find_by_id(&id)?.is_none() {
        return Err(ApiError::NotFound(format!("NAT rule not found: {id}")));
    }
    submit_or_reuse(
        &state.tasks,
        &state.engine,
        SYSTEM_ZONE,
        OperationCode::NatDelete,
        TaskPriority::Medium,
        "api",
        &serde_json::json!({ "rule_id": id }),
    )
}

#[derive(Deserialize, Serialize)]
pub struct ForwardingRequest {
    pub enable: bool,
    pub interfaces: Vec<String>,
}

pub async fn configure_forwarding<R: CommandRunner + Clone + Send + Sync + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Json(body): Json<ForwardingRequest>,
) -> Result<Response> {
    submit_or_reuse(&state.tasks, &state.engine, SYSTEM_ZONE, OperationCode::ForwardingConfigure, TaskPriority::Medium, "api", &body)
}

#[derive(Deserialize, Serialize)]
pub struct DhcpConfigRequest {
    pub net: String,
    pub netmask: String,
    pub routers: String,
    pub range_start: String,
    pub range_end: String,
    pub dns: String,
}

pub async fn update_dhcp_config<R: CommandRunner + Clone + Send + Sync + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Json(body): Json<DhcpConfigRequest>,
) -> Result<Response> {
    submit_or_reuse(&state.tasks, &state.engine, SYSTEM_ZONE, OperationCode::DhcpUpdateConfig, TaskPriority::Low, "api", &body)
}

#[derive(Deserialize, Serialize)]
pub struct DhcpHostRequest {
    pub hostname: String,
    pub mac_address: String,
    pub ip_address: String,
}

pub async fn add_dhcp_host<R: CommandRunner + Clone + Send + Sync + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Json(body): Json<DhcpHostRequest>,
) -> Result<Response> {
    submit_or_reuse(&state.tasks, &state.engine, SYSTEM_ZONE, OperationCode::DhcpAddHost, TaskPriority::Low, "api", &body)
}

pub async fn remove_dhcp_host<R: CommandRunner + Clone + Send + Sync + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Path(hostname): Path<String>,
) -> Result<Response> {
    submit_or_reuse(
        &state.tasks,
        &state.engine,
        SYSTEM_ZONE,
        OperationCode::DhcpRemoveHost,
        TaskPriority::Low,
        "api",
        &serde_json::json!({ "hostname": hostname }),
    )
}

#[derive(Deserialize, Serialize)]
pub struct DhcpServiceRequest {
    pub action: DhcpServiceAction,
}

#[derive(Deserialize, Serialize, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum DhcpServiceAction {
    Enable,
    Disable,
    Restart,
}

pub async fn dhcp_service_control<R: CommandRunner + Clone + Send + Sync + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Json(body): Json<DhcpServiceRequest>,
) -> Result<Response> {
    submit_or_reuse(&state.tasks, &state.engine, SYSTEM_ZONE, OperationCode::DhcpServiceControl, TaskPriority::Low, "api", &body)
}

#[derive(Serialize)]
pub struct DhcpStatus {
    pub configured: bool,
    pub subnet: Option<zoneweaver_core::DhcpSubnetConfig>,
    pub host_count: usize,
}

pub async fn dhcp_status<R: CommandRunner + Clone + Send + Sync + 'static>(
    State(state): State<Arc<AppState<R>>>,
) -> Result<Json<DhcpStatus>> {
    let subnet = state.dhcp_subnet.find_by_id(zoneweaver_core::DHCP_SUBNET_ID)?;
    let host_count = state.dhcp_hosts.find_all()?.len();
    Ok(Json(DhcpStatus { configured: subnet.is_some(), subnet, host_count }))
}

//! `/zones/{z}/vnc/*` and `/vnc/sessions` — VNC session lifecycle and the
//! console asset reverse proxy.

use crate::state::AppState;
use crate::validation::validate_zone_name;
use crate::{ApiError, Result};
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::sync::Arc;
use zoneweaver_core::{VncSession, VncStatus};
use zoneweaver_runtime::command::CommandRunner;

pub async fn list_sessions<R: CommandRunner + Clone + Send + Sync + 'static>(
    State(state): State<Arc<AppState<R>>>,
) -> Result<Json<Vec<VncSession>>> {
    Ok(Json(state.vnc_sessions.find_all()?))
}

#[derive(Serialize)]
pub struct VncStartResult {
    #[serde(flatten)]
    pub session: VncSession,
    pub reused_session: bool,
}

pub async fn start_vnc<R: CommandRunner + Clone + Send + Sync + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Path(zone_name): Path<String>,
) -> Result<Json<VncStartResult>> {
    validate_zone_name(&zone_name)?;
    if state.zones.find_by_id(&zone_name)?.is_none() {
        return Err(ApiError::NotFound(format!("zone not found: {zone_name}")));
    }

    let already_active = state
        .vnc_sessions
        .find_one_by(|s| s.zone_name == zone_name && matches!(s.status, VncStatus::Active))?
        .is_some();

    let ports_in_db: Vec<u16> = state
        .vnc_sessions
        .find_all_by(|s| matches!(s.status, VncStatus::Active), None::<fn(&VncSession, &VncSession) -> std::cmp::Ordering>, None)?
        .into_iter()
        .map(|s| s.web_port)
        .collect();

    let session = state.vnc.start(&zone_name, &state.host_ip, |p| ports_in_db.contains(&p)).await?;
    state.vnc_sessions.create(&session.id, &session)?;

    Ok(Json(VncStartResult { session, reused_session: already_active }))
}

pub async fn vnc_info<R: CommandRunner + Clone + Send + Sync + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Path(zone_name): Path<String>,
) -> Result<Json<VncSession>> {
    validate_zone_name(&zone_name)?;
    state
        .vnc_sessions
        .find_one_by(|s| s.zone_name == zone_name && matches!(s.status, VncStatus::Active))?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("no active VNC session for zone: {zone_name}")))
}

pub async fn stop_vnc<R: CommandRunner + Clone + Send + Sync + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Path(zone_name): Path<String>,
) -> Result<Json<serde_json::Value>> {
    validate_zone_name(&zone_name)?;
    state.vnc.kill(&zone_name).await?;
    state.vnc_sessions.destroy_by(
        |s| s.id.clone(),
        |s| s.zone_name == zone_name && matches!(s.status, VncStatus::Active),
    )?;
    Ok(Json(serde_json::json!({ "success": true })))
}

/// Reverse proxy for VNC console assets: `GET /zones/{z}/vnc/console` and
/// `GET /zones/{z}/vnc/*path`. Streams the upstream body through unchanged.
pub async fn vnc_proxy<R: CommandRunner + Clone + Send + Sync + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Path((zone_name, path)): Path<(String, String)>,
) -> Result<Response> {
    validate_zone_name(&zone_name)?;
    let session = state
        .vnc_sessions
        .find_one_by(|s| s.zone_name == zone_name && matches!(s.status, VncStatus::Active))?
        .ok_or_else(|| ApiError::NotFound(format!("no active VNC session for zone: {zone_name}")))?;

    let (status, body, content_type) = state.vnc.proxy_path(session.web_port, &path).await?;
    let status = StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);

    let mut response = (status, body).into_response();
    if let Some(ct) = content_type {
        if let Ok(value) = ct.parse() {
            response.headers_mut().insert(header::CONTENT_TYPE, value);
        }
    }
    Ok(response)
}

pub async fn vnc_console<R: CommandRunner + Clone + Send + Sync + 'static>(
    state: State<Arc<AppState<R>>>,
    Path(zone_name): Path<String>,
) -> Result<Response> {
    vnc_proxy(state, Path((zone_name, String::new()))).await
}

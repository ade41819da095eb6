//! `/provisioning/recipes/*` — CRUD over stored recipes, plus a dry-run
//! test endpoint that resolves variables without touching a PTY.

use crate::{ApiError, Result};
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use zoneweaver_core::{Recipe, RecipeStep};
use zoneweaver_runtime::command::CommandRunner;

pub async fn list_recipes<R: CommandRunner + Clone + Send + Sync + 'static>(
    State(state): State<Arc<AppState<R>>>,
) -> Result<Json<Vec<Recipe>>> {
    Ok(Json(state.recipes.find_all()?))
}

#[derive(Deserialize)]
pub struct CreateRecipe {
    pub name: String,
    pub description: String,
    pub os_family: zoneweaver_core::OsFamily,
    pub brand: String,
    #[serde(default)]
    pub is_default: bool,
    pub boot_string: String,
    pub login_prompt: String,
    pub shell_prompt: String,
    #[serde(default = "default_recipe_timeout")]
    pub timeout_seconds: u64,
    pub steps: Vec<RecipeStep>,
    #[serde(default)]
    pub variables: HashMap<String, String>,
}

fn default_recipe_timeout() -> u64 {
    300
}

pub async fn create_recipe<R: CommandRunner + Clone + Send + Sync + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Json(body): Json<CreateRecipe>,
) -> Result<(StatusCode, Json<Recipe>)> {
    let now = Utc::now();
    let recipe = Recipe {
        id: uuid::Uuid::new_v4().to_string(),
        name: body.name,
        description: body.description,
        os_family: body.os_family,
        brand: body.brand,
        is_default: body.is_default,
        boot_string: body.boot_string,
        login_prompt: body.login_prompt,
        shell_prompt: body.shell_prompt,
        timeout_seconds: body.timeout_seconds,
        steps: body.steps,
        variables: body.variables,
        created_by: "api".to_string(),
        created_at: now,
        updated_at: now,
    };
    state.recipes.create(&recipe.id, &recipe)?;
    Ok((StatusCode::CREATED, Json(recipe)))
}

pub async fn get_recipe<R: CommandRunner + Clone + Send + Sync + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Path(id): Path<String>,
) -> Result<Json<Recipe>> {
    state.recipes.find_by_id(&id)?.map(Json).ok_or_else(|| ApiError::NotFound(format!("recipe not found: {id}")))
}

pub async fn update_recipe<R: CommandRunner + Clone + Send + Sync + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Path(id): Path<String>,
    Json(body): Json<CreateRecipe>,
) -> Result<Json<Recipe>> {
    let mut existing = state.recipes.find_by_id(&id)?.ok_or_else(|| ApiError::NotFound(format!("recipe not found: {id}")))?;
    existing.name = body.name;
    existing.description = body.description;
    existing.os_family = body.os_family;
    existing.brand = body.brand;
    existing.is_default = body.is_default;
    existing.boot_string = body.boot_string;
    existing.login_prompt = body.login_prompt;
    existing.shell_prompt = body.shell_prompt;
    existing.timeout_seconds = body.timeout_seconds;
    existing.steps = body.steps;
    existing.variables = body.variables;
    existing.updated_at = Utc::now();
    state.recipes.create(&existing.id, &existing)?;
    Ok(Json(existing))
}

pub async fn delete_recipe<R: CommandRunner + Clone + Send + Sync + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    if state.recipes.find_by_id(&id)?.is_none() {
        return Err(ApiError::NotFound(format!("recipe not found: {id}")));
    }
    state.recipes.destroy_by_id(&id)?;
    Ok(Json(serde_json::json!({ "success": true })))
}

#[derive(Deserialize, Default)]
pub struct TestQuery {
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Serialize)]
pub struct DryRunResult {
    pub resolved_steps: Vec<RecipeStep>,
    pub unresolved_variables: Vec<String>,
}

/// `POST /provisioning/recipes/{id}/test`. With `dry_run=true`, resolves
/// `${var}` placeholders across every step's text fields against the
/// recipe's own `variables` map and reports anything left unresolved,
/// without opening a PTY.
pub async fn test_recipe<R: CommandRunner + Clone + Send + Sync + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Path(id): Path<String>,
    Query(q): Query<TestQuery>,
) -> Result<Json<DryRunResult>> {
    let recipe = state.recipes.find_by_id(&id)?.ok_or_else(|| ApiError::NotFound(format!("recipe not found: {id}")))?;

    if !q.dry_run {
        return Err(ApiError::Validation("test_recipe only supports dry_run=true; live execution happens through zone_setup tasks".to_string()));
    }

    let mut unresolved = Vec::new();
    let resolved_steps: Vec<RecipeStep> = recipe
        .steps
        .iter()
        .cloned()
        .map(|step| resolve_step(step, &recipe.variables, &mut unresolved))
        .collect();

    unresolved.sort();
    unresolved.dedup();
    Ok(Json(DryRunResult { resolved_steps, unresolved_variables: unresolved }))
}

fn resolve_text(text: &str, variables: &HashMap<String, String>, unresolved: &mut Vec<String>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                match variables.get(name) {
                    Some(value) => out.push_str(value),
                    None => {
                        unresolved.push(name.to_string());
                        out.push_str("${");
                        out.push_str(name);
                        out.push('}');
                    }
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str("${");
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

fn resolve_step(step: RecipeStep, variables: &HashMap<String, String>, unresolved: &mut Vec<String>) -> RecipeStep {
    match step {
        RecipeStep::Send { value } => RecipeStep::Send { value: resolve_text(&value, variables, unresolved) },
        RecipeStep::Command { value, expect_prompt, check_exit_code, timeout_ms } => RecipeStep::Command {
            value: resolve_text(&value, variables, unresolved),
            expect_prompt,
            check_exit_code,
            timeout_ms,
        },
        RecipeStep::Template { dest, content, method, expect_prompt } => RecipeStep::Template {
            dest: resolve_text(&dest, variables, unresolved),
            content: resolve_text(&content, variables, unresolved),
            method,
            expect_prompt,
        },
        other => other,
    }
}

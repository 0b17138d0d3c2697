//! HTTP API. Nest this under `/api`.
//!
//! Endpoints:
//!
//! - `POST   /chat`                Run the agent on a message
//! - `GET    /chat/status`         Chat endpoint liveness
//! - `GET    /runs`                List runs, newest first
//! - `GET    /runs/stats/summary`  Run counts by status
//! - `GET    /runs/{id}`           One run with its ordered steps
//! - `DELETE /runs/{id}`           Delete a run and its steps
//! - `GET    /tools`               Tool catalog with settings applied
//! - `GET    /tools/stats/summary` Enabled/disabled counts
//! - `GET    /tools/{id}`          One tool, with its function schema
//! - `PUT    /tools/{id}`          Enable/disable or override the description
//! - `GET    /models`              Model display names and the default

use crate::state::{RunRequest, SharedState};
use axum::{
    Router,
    extract::rejection::{JsonRejection, QueryRejection},
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
};
use chrono::Local;
use orchestrator_core::error::StoreError;
use orchestrator_core::run::{Run, RunStatus};
use orchestrator_core::tool::Tool;
use orchestrator_store::{
    DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT, RunFilter, RunStats, RunSummary, ToolSetting,
    ToolSettingUpdate,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{error, info};

// ── Router ────────────────────────────────────────────────────────────────

pub fn api_router(state: SharedState) -> Router {
    Router::new()
        .route("/chat", axum::routing::post(chat_handler))
        .route("/chat/status", get(chat_status_handler))
        .route("/runs", get(list_runs_handler))
        .route("/runs/stats/summary", get(run_stats_handler))
        .route("/runs/{id}", get(get_run_handler).delete(delete_run_handler))
        .route("/tools", get(list_tools_handler))
        .route("/tools/stats/summary", get(tool_stats_handler))
        .route("/tools/{id}", get(get_tool_handler).put(update_tool_handler))
        .route("/models", get(models_handler))
        .with_state(state)
}

// ── Errors ────────────────────────────────────────────────────────────────

/// Error body `{"detail": "..."}` with a status code.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            detail: detail.into(),
        }
    }

    pub fn not_found(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            detail: detail.into(),
        }
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            detail: detail.into(),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct ErrorResponse {
    detail: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorResponse { detail: self.detail })).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        error!(error = %e, "Store failure");
        Self::internal(e.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

// ── Request / Response types ──────────────────────────────────────────────

#[derive(Serialize, Deserialize)]
struct ChatRequest {
    message: String,
    /// Display name from the model catalog.
    #[serde(default)]
    model: Option<String>,
    /// Omit for no tools, `["auto"]` for all, or a subset to force.
    #[serde(default)]
    tools: Option<Vec<String>>,
}

#[derive(Serialize, Deserialize)]
struct ChatResponse {
    response: String,
    run_id: String,
}

#[derive(Serialize, Deserialize)]
struct ChatStatusResponse {
    status: String,
    endpoint: String,
}

#[derive(Deserialize)]
struct ListRunsParams {
    limit: Option<i64>,
    offset: Option<i64>,
    status: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct RunListItem {
    id: String,
    name: String,
    time: String,
    status: String,
    user_query: String,
}

impl From<RunSummary> for RunListItem {
    fn from(run: RunSummary) -> Self {
        Self {
            name: run.short_name(),
            time: run
                .created_at
                .with_timezone(&Local)
                .format("%I:%M %p")
                .to_string(),
            status: run.status.display_name().to_string(),
            id: run.id,
            user_query: run.user_query,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct MessageResponse {
    message: String,
}

#[derive(Serialize, Deserialize)]
struct ToolListItem {
    id: String,
    name: String,
    description: String,
    icon: String,
    enabled: bool,
}

#[derive(Serialize, Deserialize)]
struct ToolDetail {
    id: String,
    name: String,
    description: String,
    schema: serde_json::Value,
    icon: String,
    enabled: bool,
}

#[derive(Serialize, Deserialize)]
struct UpdatedTool {
    id: String,
    name: String,
    display_name: String,
    description: String,
    schema: serde_json::Value,
    enabled: bool,
    icon: String,
}

#[derive(Serialize, Deserialize)]
struct ToolStats {
    total_available: usize,
    enabled: usize,
    disabled: usize,
}

#[derive(Serialize, Deserialize)]
struct ModelsResponse {
    models: Vec<String>,
    default: String,
}

fn description_for(tool: &dyn Tool, setting: Option<&ToolSetting>) -> String {
    setting
        .and_then(|s| s.description.clone())
        .unwrap_or_else(|| tool.description().to_string())
}

// ── Handlers ──────────────────────────────────────────────────────────────

async fn chat_handler(
    State(state): State<SharedState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> ApiResult<ChatResponse> {
    let Json(payload) = payload?;
    if payload.message.trim().is_empty() {
        return Err(ApiError::bad_request("message must not be empty"));
    }
    info!(model = ?payload.model, tools = ?payload.tools, "api/chat request");

    let outcome = state
        .execute(RunRequest {
            goal: payload.message,
            model: payload.model,
            tools: payload.tools,
            max_iterations: None,
        })
        .await?;

    match outcome.answer {
        Ok(response) => Ok(Json(ChatResponse {
            response,
            run_id: outcome.run.id,
        })),
        Err(e) => Err(ApiError::internal(format!("Agent execution failed: {e}"))),
    }
}

async fn chat_status_handler() -> Json<ChatStatusResponse> {
    Json(ChatStatusResponse {
        status: "operational".into(),
        endpoint: "/api/chat".into(),
    })
}

async fn list_runs_handler(
    State(state): State<SharedState>,
    params: Result<Query<ListRunsParams>, QueryRejection>,
) -> ApiResult<Vec<RunListItem>> {
    let Query(params) = params?;

    let limit = params.limit.unwrap_or(i64::from(DEFAULT_LIST_LIMIT));
    if !(1..=i64::from(MAX_LIST_LIMIT)).contains(&limit) {
        return Err(ApiError::bad_request(format!(
            "limit must be between 1 and {MAX_LIST_LIMIT}"
        )));
    }
    let offset = params.offset.unwrap_or(0);
    let offset = u32::try_from(offset)
        .map_err(|_| ApiError::bad_request("offset must be a non-negative integer"))?;
    let status = params
        .status
        .as_deref()
        .map(str::parse::<RunStatus>)
        .transpose()
        .map_err(|_| ApiError::bad_request("status must be one of: running, completed, failed"))?;

    let filter = RunFilter {
        limit: limit as u32,
        offset,
        status,
    };
    let runs = state.store.list_runs(&filter).await?;
    Ok(Json(runs.into_iter().map(RunListItem::from).collect()))
}

async fn get_run_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Run> {
    state
        .store
        .get_run(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("Run '{id}' not found")))
}

async fn delete_run_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<MessageResponse> {
    if !state.store.delete_run(&id).await? {
        return Err(ApiError::not_found(format!("Run '{id}' not found")));
    }
    info!(run_id = %id, "Run deleted");
    Ok(Json(MessageResponse {
        message: format!("Run '{id}' deleted successfully"),
    }))
}

async fn run_stats_handler(State(state): State<SharedState>) -> ApiResult<RunStats> {
    Ok(Json(state.store.run_stats().await?))
}

async fn list_tools_handler(State(state): State<SharedState>) -> ApiResult<Vec<ToolListItem>> {
    let settings: BTreeMap<String, ToolSetting> = state
        .store
        .tool_settings()
        .await?
        .into_iter()
        .map(|s| (s.id.clone(), s))
        .collect();

    let tools = state
        .tools()
        .iter()
        .map(|tool| {
            let setting = settings.get(tool.name());
            ToolListItem {
                id: tool.name().to_string(),
                name: tool.display_name().to_string(),
                description: description_for(tool, setting),
                icon: tool.icon().to_string(),
                enabled: setting.is_none_or(|s| s.enabled),
            }
        })
        .collect();
    Ok(Json(tools))
}

async fn get_tool_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<ToolDetail> {
    let Some(tool) = state.tools().get(&id) else {
        return Err(ApiError::not_found(format!(
            "Tool '{id}' not found. Available tools: {}",
            state.tools().names().join(", ")
        )));
    };
    let setting = state.store.tool_setting(&id).await?;

    Ok(Json(ToolDetail {
        id: tool.name().to_string(),
        name: tool.display_name().to_string(),
        description: description_for(tool, setting.as_ref()),
        schema: tool.to_definition().to_openai_schema(),
        icon: tool.icon().to_string(),
        enabled: setting.is_none_or(|s| s.enabled),
    }))
}

async fn update_tool_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    payload: Result<Json<ToolSettingUpdate>, JsonRejection>,
) -> ApiResult<UpdatedTool> {
    let Json(update) = payload?;
    let Some(tool) = state.tools().get(&id) else {
        return Err(ApiError::not_found(format!("Tool '{id}' not found")));
    };

    let setting = state.store.update_tool_setting(&id, &update).await?;
    Ok(Json(UpdatedTool {
        id: tool.name().to_string(),
        name: tool.name().to_string(),
        display_name: tool.display_name().to_string(),
        description: description_for(tool, Some(&setting)),
        schema: tool.to_definition().to_openai_schema(),
        enabled: setting.enabled,
        icon: tool.icon().to_string(),
    }))
}

async fn tool_stats_handler(State(state): State<SharedState>) -> ApiResult<ToolStats> {
    let disabled = state.store.disabled_tools().await?;
    let total_available = state.tools().len();
    let disabled = state
        .tools()
        .names()
        .into_iter()
        .filter(|name| disabled.contains(*name))
        .count();
    Ok(Json(ToolStats {
        total_available,
        enabled: total_available - disabled,
        disabled,
    }))
}

async fn models_handler(State(state): State<SharedState>) -> Json<ModelsResponse> {
    Json(ModelsResponse {
        models: state.models.names().into_iter().map(String::from).collect(),
        default: state.models.default.clone(),
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────

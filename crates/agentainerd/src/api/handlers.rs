//! Handlers — REST endpoints over the lifecycle manager and request store.

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::agent::{Agent, DeploySpec};
use crate::replay;
use crate::request::StoredRequest;
use crate::state::AppState;
use crate::store::keys::Queue;

use super::error::ApiError;
use super::response::ApiResponse;

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

// ── Health ────────────────────────────────────────────────────────

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let engine_ok = state.docker.ping().await.is_ok();
    let store_ok = state.store.ping().await.is_ok();

    Json(ApiResponse::with_data(
        "ok",
        json!({
            "status": if engine_ok && store_ok { "healthy" } else { "degraded" },
            "engine": engine_ok,
            "store": store_ok,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }),
    ))
}

// ── Agents ────────────────────────────────────────────────────────

pub async fn deploy_agent(
    State(state): State<AppState>,
    Json(spec): Json<DeploySpec>,
) -> ApiResult<Agent> {
    let agent = state.lifecycle.deploy(spec).await?;
    Ok(Json(ApiResponse::with_data("Agent deployed", agent)))
}

pub async fn list_agents(State(state): State<AppState>) -> ApiResult<Vec<Agent>> {
    let agents = state.lifecycle.list_agents().await?;
    Ok(Json(ApiResponse::ok(agents)))
}

pub async fn get_agent(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Agent> {
    let agent = state.lifecycle.get_agent(&id).await?;
    Ok(Json(ApiResponse::ok(agent)))
}

pub async fn start_agent(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Agent> {
    let agent = state.lifecycle.start(&id).await?;
    Ok(Json(ApiResponse::with_data("Agent started", agent)))
}

pub async fn stop_agent(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Agent> {
    let agent = state.lifecycle.stop(&id).await?;
    Ok(Json(ApiResponse::with_data("Agent stopped", agent)))
}

pub async fn restart_agent(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Agent> {
    let agent = state.lifecycle.restart(&id).await?;
    Ok(Json(ApiResponse::with_data("Agent restarted", agent)))
}

pub async fn pause_agent(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Agent> {
    let agent = state.lifecycle.pause(&id).await?;
    Ok(Json(ApiResponse::with_data("Agent paused", agent)))
}

pub async fn resume_agent(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Agent> {
    let agent = state.lifecycle.resume(&id).await?;
    Ok(Json(ApiResponse::with_data("Agent resumed", agent)))
}

pub async fn remove_agent(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<()> {
    state.lifecycle.remove(&id).await?;
    Ok(Json(ApiResponse::message("Agent removed")))
}

// ── Logs ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    #[serde(default)]
    pub follow: bool,
    pub tail: Option<u64>,
}

pub async fn agent_logs(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<LogsQuery>,
) -> Result<Response, ApiError> {
    let stream = state.lifecycle.logs(&id, query.follow, query.tail).await?;

    let response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .body(Body::from_stream(stream))
        .map_err(|e| ApiError::Engine(e.to_string()))?;
    Ok(response)
}

// ── Requests ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RequestsQuery {
    pub status: Option<String>,
}

fn require_persistence(state: &AppState) -> Result<(), ApiError> {
    if state.persistence_enabled() {
        Ok(())
    } else {
        Err(ApiError::PersistenceDisabled)
    }
}

pub async fn list_requests(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<RequestsQuery>,
) -> ApiResult<Vec<StoredRequest>> {
    require_persistence(&state)?;
    // 404 for unknown agents, not an empty list.
    state.lifecycle.get_agent(&id).await?;

    let queue = match query.status.as_deref() {
        None | Some("pending") => Queue::Pending,
        Some("completed") => Queue::Completed,
        Some("failed") => Queue::Failed,
        Some(other) => {
            return Err(ApiError::Validation(format!(
                "unknown queue status: {}",
                other
            )))
        }
    };

    let requests = state.requests.read_queue(&id, queue).await?;
    Ok(Json(ApiResponse::ok(requests)))
}

pub async fn get_request(
    State(state): State<AppState>,
    Path((id, request_id)): Path<(String, String)>,
) -> ApiResult<StoredRequest> {
    require_persistence(&state)?;

    let request = state
        .requests
        .get_request(&id, &request_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Request not found: {}", request_id)))?;
    Ok(Json(ApiResponse::ok(request)))
}

/// Manual replay: rebuild the stored request and push it back through the
/// proxy's forwarding path, behind the same in-flight gate the background
/// worker uses so the two never dispatch the same request concurrently.
pub async fn replay_request(
    State(state): State<AppState>,
    Path((id, request_id)): Path<(String, String)>,
) -> ApiResult<serde_json::Value> {
    require_persistence(&state)?;
    state.lifecycle.get_agent(&id).await?;

    let request = state
        .requests
        .get_request(&id, &request_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Request not found: {}", request_id)))?;

    match replay::replay_one(&state, &id, &request).await {
        None => Err(ApiError::Conflict(format!(
            "Request {} is not replayable (completed, in flight, or out of retries)",
            request_id
        ))),
        Some(Err(e)) => Err(ApiError::Upstream(format!("Replay forward failed: {}", e))),
        Some(Ok(status)) => Ok(Json(ApiResponse::with_data(
            "Replay forwarded",
            json!({
                "request_id": request_id,
                "status_code": status.as_u16(),
            }),
        ))),
    }
}

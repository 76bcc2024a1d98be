//! Route — axum handlers for the public `/agent/{id}/*` surface.

use axum::extract::{Path, Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::warn;
use uuid::Uuid;

use crate::agent::model::MAX_ID_BYTES;
use crate::agent::{AgentStatus, LifecycleError};
use crate::api::response::ApiResponse;
use crate::request::model::first_header_values;
use crate::state::AppState;

use super::forward::{
    agent_path, forward_ephemeral, forward_stored, pending_response, HEADER_REPLAY,
    HEADER_REQUEST_ID,
};

/// Upper bound on buffered proxy bodies.
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

pub async fn proxy_root(
    State(state): State<AppState>,
    Path(id): Path<String>,
    request: Request,
) -> Response {
    handle(state, id, String::new(), request).await
}

pub async fn proxy_subpath(
    State(state): State<AppState>,
    Path((id, rest)): Path<(String, String)>,
    request: Request,
) -> Response {
    handle(state, id, rest, request).await
}

async fn handle(state: AppState, agent_id: String, rest: String, request: Request) -> Response {
    if agent_id.len() > MAX_ID_BYTES {
        return error_response(StatusCode::BAD_REQUEST, "Agent ID too long");
    }

    let agent = match state.lifecycle.get_agent(&agent_id).await {
        Ok(agent) => agent,
        Err(LifecycleError::NotFound(_)) => {
            return error_response(StatusCode::NOT_FOUND, "Agent not found");
        }
        Err(e) => {
            warn!(agent_id = %agent_id, error = %e, "Agent lookup failed");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Agent lookup failed");
        }
    };

    let query = request.uri().query().map(str::to_string);
    let path = agent_path(&rest, query.as_deref());
    let method = request.method().as_str().to_string();

    let is_replay = request
        .headers()
        .get(HEADER_REPLAY)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    let (parts, body) = request.into_parts();
    let body = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(_) => {
            return error_response(StatusCode::BAD_REQUEST, "Failed to read request body");
        }
    };

    if !state.persistence_enabled() {
        if agent.status != AgentStatus::Running {
            return error_response(
                StatusCode::SERVICE_UNAVAILABLE,
                "Agent is not running and request persistence is disabled",
            );
        }
        let headers = first_header_values(&parts.headers);
        let request_id = format!("req-{}", Uuid::new_v4());
        return forward_ephemeral(
            &state,
            &agent,
            &method,
            &path,
            &headers,
            body.to_vec(),
            &request_id,
        )
        .await;
    }

    // Replays reuse the stored record; everything else is persisted before
    // any forwarding is attempted.
    let stored = if is_replay {
        let Some(request_id) = parts
            .headers
            .get(HEADER_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
        else {
            return error_response(
                StatusCode::BAD_REQUEST,
                "Replay requests must carry X-Agentainer-Request-ID",
            );
        };
        match state.requests.get_request(&agent_id, request_id).await {
            Ok(Some(request)) => request,
            Ok(None) => return error_response(StatusCode::NOT_FOUND, "Request not found"),
            Err(e) => {
                warn!(agent_id = %agent_id, error = %e, "Request lookup failed");
                return error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Request lookup failed",
                );
            }
        }
    } else {
        match state
            .requests
            .store_request(&agent_id, &method, &path, &parts.headers, body.to_vec())
            .await
        {
            Ok(request) => request,
            Err(e) => {
                warn!(agent_id = %agent_id, error = %e, "Failed to persist request");
                return error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to persist request",
                );
            }
        }
    };

    if agent.status != AgentStatus::Running {
        // A replay racing a status change must not strand the record in
        // processing, or no future drain pass would ever pick it up again.
        if is_replay {
            if let Err(e) = state.requests.reset_pending(&agent_id, &stored.id).await {
                warn!(
                    agent_id = %agent_id,
                    request_id = %stored.id,
                    error = %e,
                    "Failed to reset replayed request to pending"
                );
            }
        }
        // Already queued; the replay worker delivers once the agent runs.
        return pending_response(&stored.id, "Agent is not running, request queued");
    }

    forward_stored(&state, &agent, &stored, is_replay).await
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(ApiResponse::<()>::error(message))).into_response()
}

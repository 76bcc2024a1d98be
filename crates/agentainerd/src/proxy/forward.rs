//! Forward — the store-and-forward core of the reverse proxy.
//!
//! Every inbound agent request is persisted before the forward, the response
//! is persisted after it, and transport crashes leave the stored request
//! pending so the replay worker retries once the agent reappears.

use std::collections::HashMap;

use axum::body::Body;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use tracing::{debug, warn};

use crate::agent::Agent;
use crate::api::response::ApiResponse;
use crate::request::model::first_header_values;
use crate::request::StoredRequest;
use crate::state::AppState;

/// Marks a request as a replay; the proxy must not re-store it.
pub const HEADER_REPLAY: &str = "x-agentainer-replay";
/// Correlation ID injected on every forward.
pub const HEADER_REQUEST_ID: &str = "x-agentainer-request-id";

/// Headers that never cross the proxy (RFC 7230 hop-by-hop, plus the ones the
/// forward rebuilds itself).
const SKIPPED_HEADERS: &[&str] = &[
    "connection",
    "proxy-connection",
    "keep-alive",
    "transfer-encoding",
    "upgrade",
    "te",
    "trailer",
    "proxy-authenticate",
    "proxy-authorization",
    "host",
    "content-length",
    HEADER_REPLAY,
    HEADER_REQUEST_ID,
];

/// Agent-relative path: prefix-stripped rest plus the original query string.
/// An empty rest maps to `/`.
pub fn agent_path(rest: &str, query: Option<&str>) -> String {
    let mut path = if rest.is_empty() {
        "/".to_string()
    } else if rest.starts_with('/') {
        rest.to_string()
    } else {
        format!("/{}", rest)
    };
    if let Some(query) = query {
        path.push('?');
        path.push_str(query);
    }
    path
}

/// Headers to send downstream: stored first-value-per-key map, minus skipped
/// names, plus the correlation ID.
pub fn build_forward_headers(stored: &HashMap<String, String>, request_id: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in stored {
        if SKIPPED_HEADERS.contains(&name.to_ascii_lowercase().as_str()) {
            continue;
        }
        let Ok(name) = HeaderName::from_bytes(name.as_bytes()) else {
            continue;
        };
        let Ok(value) = HeaderValue::from_str(value) else {
            continue;
        };
        headers.insert(name, value);
    }
    if let Ok(value) = HeaderValue::from_str(request_id) {
        headers.insert(HeaderName::from_static(HEADER_REQUEST_ID), value);
    }
    headers
}

/// Whether a forward error means "the agent crashed or is gone" rather than
/// "the request is bad": connection refused, unknown host, reset mid-flight.
pub fn is_transport_crash(err: &reqwest::Error) -> bool {
    if err.is_connect() {
        return true;
    }
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        if let Some(io) = cause.downcast_ref::<std::io::Error>() {
            if matches!(
                io.kind(),
                std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::NotConnected
            ) {
                return true;
            }
        }
        source = cause.source();
    }
    false
}

/// The raw forward: one HTTP exchange with the agent over the internal
/// network, correlation header attached.
async fn forward_raw(
    state: &AppState,
    agent: &Agent,
    method: &str,
    path: &str,
    headers: &HashMap<String, String>,
    body: Vec<u8>,
    request_id: &str,
) -> Result<(StatusCode, HeaderMap, Bytes), ForwardFailure> {
    let url = format!(
        "http://{}:{}{}",
        agent.id, state.config.requests.agent_port, path
    );
    let method = reqwest::Method::from_bytes(method.as_bytes())
        .map_err(|_| ForwardFailure::BadMethod(method.to_string()))?;

    let response = state
        .http
        .request(method, &url)
        .headers(build_forward_headers(headers, request_id))
        .body(body)
        .send()
        .await
        .map_err(ForwardFailure::Transport)?;

    let status = StatusCode::from_u16(response.status().as_u16())
        .unwrap_or(StatusCode::BAD_GATEWAY);
    let headers = response.headers().clone();
    let bytes = response
        .bytes()
        .await
        .map_err(ForwardFailure::Transport)?;

    Ok((status, headers, bytes))
}

enum ForwardFailure {
    BadMethod(String),
    Transport(reqwest::Error),
}

/// Forward a stored request and do all the bookkeeping.
///
/// On any received response (whatever its status code) the delivery counts as
/// successful and the response is persisted verbatim. Transport crashes on
/// live traffic leave the request pending; on replay traffic they count
/// against the retry budget, as does every other failure.
pub async fn forward_stored(
    state: &AppState,
    agent: &Agent,
    request: &StoredRequest,
    is_replay: bool,
) -> Response {
    let outcome = forward_raw(
        state,
        agent,
        &request.method,
        &request.path,
        &request.headers,
        request.body.clone(),
        &request.id,
    )
    .await;

    match outcome {
        Ok((status, headers, body)) => {
            let stored_headers = first_header_values(&headers);
            if let Err(e) = state
                .requests
                .store_response(
                    &agent.id,
                    &request.id,
                    status.as_u16(),
                    stored_headers,
                    body.to_vec(),
                )
                .await
            {
                warn!(
                    agent_id = %agent.id,
                    request_id = %request.id,
                    error = %e,
                    "Failed to persist response"
                );
            }
            relay_response(status, &headers, body)
        }
        Err(ForwardFailure::BadMethod(method)) => {
            let _ = state
                .requests
                .mark_failed(&agent.id, &request.id, &format!("bad method: {}", method))
                .await;
            error_response(
                StatusCode::BAD_REQUEST,
                &format!("Invalid request method: {}", method),
            )
        }
        Err(ForwardFailure::Transport(err)) => {
            if is_transport_crash(&err) && !is_replay {
                // Agent crashed mid-flight: the record stays pending and the
                // replay worker delivers it once the agent is back.
                debug!(
                    agent_id = %agent.id,
                    request_id = %request.id,
                    error = %err,
                    "Transport crash, leaving request pending"
                );
                return pending_response(&request.id, "agent unreachable, request queued");
            }

            if let Err(e) = state
                .requests
                .mark_failed(&agent.id, &request.id, &err.to_string())
                .await
            {
                warn!(
                    agent_id = %agent.id,
                    request_id = %request.id,
                    error = %e,
                    "Failed to record delivery failure"
                );
            }
            error_response(
                StatusCode::BAD_GATEWAY,
                &format!("Forward to agent failed: {}", err),
            )
        }
    }
}

/// Forward without persistence (feature switch off): a plain reverse proxy.
pub async fn forward_ephemeral(
    state: &AppState,
    agent: &Agent,
    method: &str,
    path: &str,
    headers: &HashMap<String, String>,
    body: Vec<u8>,
    request_id: &str,
) -> Response {
    match forward_raw(state, agent, method, path, headers, body, request_id).await {
        Ok((status, headers, body)) => relay_response(status, &headers, body),
        Err(ForwardFailure::BadMethod(method)) => error_response(
            StatusCode::BAD_REQUEST,
            &format!("Invalid request method: {}", method),
        ),
        Err(ForwardFailure::Transport(err)) => error_response(
            StatusCode::BAD_GATEWAY,
            &format!("Forward to agent failed: {}", err),
        ),
    }
}

/// Rebuild the agent's response for the caller, dropping hop-by-hop headers.
fn relay_response(status: StatusCode, headers: &HeaderMap, body: Bytes) -> Response {
    let mut response = Response::builder().status(status);
    if let Some(out) = response.headers_mut() {
        for (name, value) in headers {
            if SKIPPED_HEADERS.contains(&name.as_str()) {
                continue;
            }
            out.append(name.clone(), value.clone());
        }
    }
    response
        .body(Body::from(body))
        .unwrap_or_else(|_| StatusCode::BAD_GATEWAY.into_response())
}

pub fn pending_response(request_id: &str, message: &str) -> Response {
    (
        StatusCode::ACCEPTED,
        axum::Json(ApiResponse::with_data(
            message,
            serde_json::json!({ "request_id": request_id, "status": "pending" }),
        )),
    )
        .into_response()
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, axum::Json(ApiResponse::<()>::error(message))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_path_defaults_to_root() {
        assert_eq!(agent_path("", None), "/");
    }

    #[test]
    fn agent_path_prefixes_slash() {
        assert_eq!(agent_path("ping", None), "/ping");
        assert_eq!(agent_path("a/b/c", None), "/a/b/c");
    }

    #[test]
    fn agent_path_keeps_existing_slash() {
        assert_eq!(agent_path("/ping", None), "/ping");
    }

    #[test]
    fn agent_path_appends_query() {
        assert_eq!(agent_path("search", Some("q=1&x=2")), "/search?q=1&x=2");
        assert_eq!(agent_path("", Some("q=1")), "/?q=1");
    }

    #[test]
    fn forward_headers_drop_hop_by_hop_and_internal() {
        let stored = HashMap::from([
            ("content-type".to_string(), "application/json".to_string()),
            ("connection".to_string(), "keep-alive".to_string()),
            ("host".to_string(), "proxy.local".to_string()),
            ("transfer-encoding".to_string(), "chunked".to_string()),
            ("x-agentainer-replay".to_string(), "true".to_string()),
            ("x-custom".to_string(), "kept".to_string()),
        ]);

        let headers = build_forward_headers(&stored, "req-1");
        assert_eq!(headers.get("content-type").unwrap(), "application/json");
        assert_eq!(headers.get("x-custom").unwrap(), "kept");
        assert_eq!(headers.get(HEADER_REQUEST_ID).unwrap(), "req-1");
        assert!(headers.get("connection").is_none());
        assert!(headers.get("host").is_none());
        assert!(headers.get("transfer-encoding").is_none());
        assert!(headers.get(HEADER_REPLAY).is_none());
    }

    #[test]
    fn forward_headers_overwrite_inbound_request_id() {
        let stored = HashMap::from([(
            "x-agentainer-request-id".to_string(),
            "req-spoofed".to_string(),
        )]);
        let headers = build_forward_headers(&stored, "req-real");
        assert_eq!(headers.get(HEADER_REQUEST_ID).unwrap(), "req-real");
    }

    #[test]
    fn relay_drops_hop_by_hop() {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", HeaderValue::from_static("text/plain"));
        headers.insert("connection", HeaderValue::from_static("close"));
        let response = relay_response(StatusCode::OK, &headers, Bytes::from_static(b"ok"));
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get("content-type").is_some());
        assert!(response.headers().get("connection").is_none());
    }
}

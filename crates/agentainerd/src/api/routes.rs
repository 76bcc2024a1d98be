//! Routes — one listener, two route families: the authenticated control API
//! and the public per-agent proxy.

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{any, get, post};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::proxy::route::{proxy_root, proxy_subpath};
use crate::state::AppState;

use super::{auth, handlers};

/// Bodies larger than this are rejected at the boundary.
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

pub fn router(state: AppState) -> Router {
    // Everything under /agents requires the shared bearer token.
    let api = Router::new()
        .route(
            "/agents",
            post(handlers::deploy_agent).get(handlers::list_agents),
        )
        .route(
            "/agents/{id}",
            get(handlers::get_agent).delete(handlers::remove_agent),
        )
        .route("/agents/{id}/start", post(handlers::start_agent))
        .route("/agents/{id}/stop", post(handlers::stop_agent))
        .route("/agents/{id}/restart", post(handlers::restart_agent))
        .route("/agents/{id}/pause", post(handlers::pause_agent))
        .route("/agents/{id}/resume", post(handlers::resume_agent))
        .route("/agents/{id}/logs", get(handlers::agent_logs))
        .route("/agents/{id}/requests", get(handlers::list_requests))
        .route(
            "/agents/{id}/requests/{request_id}",
            get(handlers::get_request),
        )
        .route(
            "/agents/{id}/requests/{request_id}/replay",
            post(handlers::replay_request),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_bearer,
        ));

    Router::new()
        .route("/health", get(handlers::health))
        // Proxy routes are public: the agent surface is reachable without the
        // control-plane token, but every byte still flows through the store.
        .route("/agent/{id}", any(proxy_root))
        .route("/agent/{id}/", any(proxy_root))
        .route("/agent/{id}/{*rest}", any(proxy_subpath))
        .merge(api)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(DefaultBodyLimit::max(MAX_BODY_BYTES)),
        )
        .with_state(state)
}

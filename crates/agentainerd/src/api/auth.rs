//! Auth — shared bearer-token check for the authenticated API subtree.
//!
//! Proxy routes and /health stay public; everything else requires the
//! configured token.

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::state::AppState;

use super::error::ApiError;

/// Whether the Authorization header value grants access.
pub fn token_matches(header: Option<&str>, expected: &str) -> bool {
    match header.and_then(|v| v.strip_prefix("Bearer ")) {
        Some(token) => !expected.is_empty() && token == expected,
        None => false,
    }
}

pub async fn require_bearer(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    if !token_matches(header, &state.config.security.default_token) {
        return ApiError::Unauthorized.into_response();
    }

    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_the_configured_token() {
        assert!(token_matches(Some("Bearer secret"), "secret"));
    }

    #[test]
    fn rejects_missing_header() {
        assert!(!token_matches(None, "secret"));
    }

    #[test]
    fn rejects_wrong_token() {
        assert!(!token_matches(Some("Bearer nope"), "secret"));
    }

    #[test]
    fn rejects_non_bearer_schemes() {
        assert!(!token_matches(Some("Basic c2VjcmV0"), "secret"));
        assert!(!token_matches(Some("secret"), "secret"));
    }

    #[test]
    fn rejects_empty_configured_token() {
        // An empty configured token must not turn auth off.
        assert!(!token_matches(Some("Bearer "), ""));
    }
}

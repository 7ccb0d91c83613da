//! Bearer-token auth gate shared across `/health` and `/mcp` (spec §4.11:
//! "All three honor `Authorization: Bearer <token>` when configured").
//! `/ssh` checks the token itself during the WebSocket upgrade, since it
//! also accepts `?token=` for clients that can't set headers on a WS
//! handshake (spec §6).

use std::sync::Arc;

use axum::extract::Request;
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

#[derive(Clone)]
pub struct AuthState {
    pub token: Option<Arc<str>>,
}

impl AuthState {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: token.map(Arc::from),
        }
    }

    /// `true` if no token is configured, or the given bearer value matches.
    pub fn accepts(&self, presented: Option<&str>) -> bool {
        match &self.token {
            None => true,
            Some(expected) => presented == Some(expected.as_ref()),
        }
    }
}

pub async fn require_bearer(
    axum::extract::State(state): axum::extract::State<AuthState>,
    request: Request,
    next: Next,
) -> Response {
    let presented = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    if state.accepts(presented) {
        next.run(request).await
    } else {
        (StatusCode::UNAUTHORIZED, "authentication failed").into_response()
    }
}

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};

use crate::error::AppError;

/// Header the fronting auth layer sets to the authenticated user id.
pub const OWNER_HEADER: &str = "x-owner-id";

/// Paths that authenticate with their own credential instead of the API token.
const SELF_AUTHENTICATED: &[&str] = &["/api/heartbeat"];

/// Shared API token. `None` disables the check.
#[derive(Clone, Default)]
pub struct ApiToken(pub Option<Arc<str>>);

impl ApiToken {
    pub fn new(token: Option<&str>) -> Self {
        Self(token.filter(|t| !t.is_empty()).map(Arc::from))
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &axum::http::HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Gate `/api/*` behind the shared token when one is configured.
///
/// 1. No token configured → passthrough
/// 2. Self-authenticated path (heartbeats) → passthrough
/// 3. Bearer token matches → passthrough
/// 4. Otherwise → 401 JSON
pub async fn api_token_middleware(
    State(token): State<ApiToken>,
    req: Request,
    next: Next,
) -> Response {
    let Some(expected) = token.0.as_deref() else {
        return next.run(req).await;
    };

    let path = req.uri().path();
    if SELF_AUTHENTICATED.iter().any(|p| *p == path) {
        return next.run(req).await;
    }

    if bearer_token(req.headers()) == Some(expected) {
        return next.run(req).await;
    }

    Response::builder()
        .status(401)
        .header("Content-Type", "application/json")
        .body(Body::from(r#"{"error":"unauthorized"}"#))
        .expect("infallible: all header values are valid ASCII")
}

/// The caller's user id, as asserted by the fronting auth layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Owner(pub String);

impl<S> FromRequestParts<S> for Owner
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(OWNER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| Owner(v.to_string()))
            .ok_or_else(|| AppError::unauthorized("missing owner identity"))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

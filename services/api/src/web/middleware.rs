//! services/api/src/web/middleware.rs
//!
//! Authentication middleware for protecting routes.

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::debug;

use crate::error::ApiError;
use crate::web::state::AppState;

/// The caller behind a valid bearer token.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub email: String,
}

/// Middleware that validates the `Authorization: Bearer` token.
///
/// If valid, inserts an `AuthenticatedUser` into request extensions for handlers to use.
/// If invalid or missing, returns 401 Unauthorized.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    // 1. Extract the bearer token
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::Unauthorized("missing bearer token".to_string()))?;

    // 2. Check signature and expiry
    let claims = state.tokens.validate(token).map_err(|e| {
        debug!("Rejected bearer token: {}", e);
        ApiError::Token(e)
    })?;

    // 3. Hand the identity to the handler
    req.extensions_mut().insert(AuthenticatedUser { email: claims.sub });
    Ok(next.run(req).await)
}

//! services/api/src/web/users.rs
//!
//! Administrative user endpoints. All of them sit behind `require_auth`.

use crate::error::ApiError;
use crate::web::auth::UserResponse;
use crate::web::middleware::AuthenticatedUser;
use crate::web::state::AppState;
use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DropUsersResponse {
    pub removed: u64,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct EmailQuery {
    /// Matched case-insensitively.
    pub email: String,
}

/// GET /users/by-email - Look up one user by email
#[utoipa::path(
    get,
    path = "/users/by-email",
    params(EmailQuery),
    responses(
        (status = 200, description = "The matching user", body = UserResponse),
        (status = 400, description = "Missing email"),
        (status = 401, description = "Missing or invalid bearer token"),
        (status = 404, description = "No user has this email")
    ),
    security(("bearer" = []))
)]
pub async fn get_user_by_email_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EmailQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state.users.get_user_by_email(&query.email).await?;
    Ok(Json(UserResponse {
        id: user.id,
        email: user.email,
    }))
}

/// GET /users - List all registered users
#[utoipa::path(
    get,
    path = "/users",
    responses(
        (status = 200, description = "Every registered user", body = [UserResponse]),
        (status = 401, description = "Missing or invalid bearer token")
    ),
    security(("bearer" = []))
)]
pub async fn list_users_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let users: Vec<UserResponse> = state
        .users
        .get_all_users()
        .await?
        .into_iter()
        .map(|u| UserResponse {
            id: u.id,
            email: u.email,
        })
        .collect();
    Ok(Json(users))
}

/// DELETE /users - Remove every user. Bins are left untouched.
#[utoipa::path(
    delete,
    path = "/users",
    responses(
        (status = 200, description = "Number of removed users", body = DropUsersResponse),
        (status = 401, description = "Missing or invalid bearer token")
    ),
    security(("bearer" = []))
)]
pub async fn drop_users_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<AuthenticatedUser>,
) -> Result<impl IntoResponse, ApiError> {
    warn!(caller = %caller.email, "Dropping all users");
    let removed = state.users.drop_all_users().await?;
    Ok(Json(DropUsersResponse { removed }))
}

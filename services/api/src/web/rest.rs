//! services/api/src/web/rest.rs
//!
//! Assembles the REST router and holds the master definition for the
//! OpenAPI specification.

use crate::web::{auth, bins, middleware::require_auth, state::AppState, users};
use axum::{
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        bins::create_bin_handler,
        bins::create_file_bin_handler,
        bins::list_bins_handler,
        bins::statistics_handler,
        bins::get_bin_handler,
        bins::download_file_handler,
        bins::update_bin_handler,
        bins::delete_bin_handler,
        bins::set_expiration_handler,
        auth::signup_handler,
        auth::login_handler,
        users::list_users_handler,
        users::get_user_by_email_handler,
        users::drop_users_handler,
    ),
    components(
        schemas(
            bins::BinKind,
            bins::BinResponse,
            bins::CreateBinRequest,
            bins::UpdateBinRequest,
            bins::ExpirationRequest,
            bins::BinClicksResponse,
            bins::StatisticsResponse,
            auth::SignupRequest,
            auth::LoginRequest,
            auth::UserResponse,
            auth::TokenResponse,
            users::DropUsersResponse,
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "Pastebin API", description = "Create, share and expire text and file bins.")
    )
)]
pub struct ApiDoc;

/// Registers the `bearer` security scheme referenced by the user endpoints.
struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

//=========================================================================================
// Router
//=========================================================================================

/// Builds the full API router. CORS and the Swagger UI are layered on by the binary.
pub fn router(app_state: Arc<AppState>) -> Router {
    let max_upload = app_state.config.max_upload_bytes;

    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/bins", post(bins::create_bin_handler).get(bins::list_bins_handler))
        .route("/bins/files", post(bins::create_file_bin_handler))
        .route("/bins/statistics", get(bins::statistics_handler))
        .route(
            "/bins/{ident}",
            get(bins::get_bin_handler)
                .put(bins::update_bin_handler)
                .delete(bins::delete_bin_handler),
        )
        .route("/bins/{ident}/file", get(bins::download_file_handler))
        .route("/bins/{ident}/expiration", put(bins::set_expiration_handler))
        .route("/auth/signup", post(auth::signup_handler))
        .route("/auth/login", post(auth::login_handler));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route(
            "/users",
            get(users::list_users_handler).delete(users::drop_users_handler),
        )
        .route("/users/by-email", get(users::get_user_by_email_handler))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_auth,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(DefaultBodyLimit::max(max_upload))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{Argon2Hasher, FsBlobStorage, RedisStore, TokenIssuer},
    config::Config,
    error::ApiError,
    web::{router, ApiDoc, AppState},
};
use axum::http::{
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    Method,
};
use axum::Router;
use pastebin_core::{BinRepository, KeyValueStore, MemoryStore, UserRepository};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

const MEMORY_SWEEP_PERIOD: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to the Key-Value Store ---
    let store: Arc<dyn KeyValueStore> = match &config.redis_url {
        Some(url) => {
            info!("Connecting to Redis...");
            Arc::new(RedisStore::connect(url).await?)
        }
        None => {
            warn!("REDIS_URL is not set; using the in-memory store. Data is lost on restart.");
            let memory = MemoryStore::new();
            // Frees expired keys that are never read again.
            let _sweeper = memory.spawn_sweeper(MEMORY_SWEEP_PERIOD);
            Arc::new(memory)
        }
    };

    // --- 3. Initialize Service Adapters ---
    let blobs = Arc::new(FsBlobStorage::new(config.files_dir.clone()));
    info!("Storing uploaded files in {}", blobs.root().display());

    let tokens = match &config.jwt_secret {
        Some(secret) => TokenIssuer::new(secret.as_bytes(), config.token_ttl_hours),
        None => {
            warn!("JWT_SECRET is not set; generating a per-process secret.");
            TokenIssuer::with_random_secret(config.token_ttl_hours)
        }
    };

    // --- 4. Build the Shared AppState ---
    let bins = BinRepository::new(store.clone(), blobs).with_retention(config.bin_retention);
    let users = UserRepository::new(store, Arc::new(Argon2Hasher::new()));
    let app_state = Arc::new(AppState::new(bins, users, tokens, config.clone()));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);

    // --- 5. Create the Web Router ---
    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(router(app_state))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(cors);

    // --- 6. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

/// Resolves on Ctrl-C or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received, draining connections...");
}

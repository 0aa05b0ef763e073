mod config;
mod db;
mod error;
mod handlers;
mod middleware;
mod models;
mod services;
mod storage;

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::db::Database;
use crate::services::SharePasswordHasher;
use crate::storage::{LocalStorage, StorageProvider};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub config: Arc<Config>,
    pub storage: Arc<dyn StorageProvider>,
    pub hasher: SharePasswordHasher,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "docshare=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting docshare...");

    let config = Arc::new(Config::load()?);
    tracing::info!("Configuration loaded");

    let db = Database::new(&config.database.path).await?;
    db.run_migrations().await?;
    tracing::info!("Database initialized");

    let storage: Arc<dyn StorageProvider> =
        Arc::new(LocalStorage::new(&config.storage.upload_path));
    let hasher = SharePasswordHasher::new(&config.share)?;

    let state = AppState {
        db,
        config: config.clone(),
        storage,
        hasher,
    };

    let app = create_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Public routes (share token is the credential)
    let public_routes = Router::new()
        .route("/shares/access/:share_id", post(handlers::share::access_share))
        .route(
            "/shares/download/:share_id/:document_id",
            get(handlers::share::download_shared_document),
        );

    // Protected routes (auth required)
    let protected_routes = Router::new()
        // Documents
        .route("/documents", get(handlers::document::list_documents))
        .route(
            "/documents/upload",
            post(handlers::document::upload_document)
                .layer(DefaultBodyLimit::max(state.config.storage.max_upload_bytes)),
        )
        .route("/documents/:id", delete(handlers::document::delete_document))
        .route(
            "/documents/download/:id",
            get(handlers::document::download_document),
        )
        // Shares
        .route(
            "/shares",
            get(handlers::share::list_shares).post(handlers::share::create_share),
        )
        .route("/shares/:share_id", delete(handlers::share::delete_share))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::auth_middleware,
        ));

    Router::new()
        .nest("/api", public_routes.merge(protected_routes))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

use axum::{
    http::{header, Method, StatusCode},
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, CorsLayer};

mod config;
mod db;
pub mod error;
mod extractor;
mod gmail;
mod handlers;
mod models;
mod rate_limit;
mod sanitize;
mod schema;
mod services;
mod vault;

use crate::config::AppConfig;
use crate::db::DbPool;
use crate::extractor::TaskExtractor;
use crate::rate_limit::RateGate;
use crate::vault::TokenVault;

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub config: Arc<AppConfig>,
    pub vault: Arc<TokenVault>,
    pub rate_gate: Arc<RateGate>,
    pub extractor: Arc<TaskExtractor>,
    /// Plain HTTP client for OAuth token exchanges.
    pub http: reqwest::Client,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    dotenvy::dotenv().ok();

    let config = AppConfig::from_env()?;
    let port = config.port;

    // Establish database connection pool
    let pool = db::establish_connection_pool()?;

    let state = AppState {
        pool,
        vault: Arc::new(TokenVault::from_config(&config)),
        rate_gate: Arc::new(RateGate::new()),
        extractor: Arc::new(TaskExtractor::from_config(&config)?),
        http: reqwest::Client::builder()
            .timeout(Duration::from_secs(config.external_timeout_secs))
            .build()?,
        config: Arc::new(config),
    };

    let app = Router::new()
        .route("/health", get(health_check))
        // User routes
        .route("/api/users", post(handlers::create_user))
        .route("/api/users/:user_id", get(handlers::get_user))
        // Ingestion trigger
        .route(
            "/api/users/:user_id/emails/process",
            post(handlers::process_emails),
        )
        // Task routes
        .route("/api/users/:user_id/tasks", get(handlers::list_tasks))
        .route("/api/tasks/:task_id/complete", post(handlers::complete_task))
        .route("/api/tasks/:task_id/reopen", post(handlers::reopen_task))
        // Email routes
        .route("/api/users/:user_id/emails", get(handlers::list_emails))
        // OAuth routes
        .route(
            "/api/users/:user_id/gmail/connect",
            get(handlers::gmail_connect),
        )
        .route("/api/oauth/callback", get(handlers::oauth_callback))
        .layer(build_cors_layer())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check() -> StatusCode {
    StatusCode::OK
}

/// Build CORS layer based on environment configuration.
///
/// If CORS_ALLOWED_ORIGINS is set, only those origins are allowed.
/// If not set, defaults to permissive CORS (for development only).
fn build_cors_layer() -> CorsLayer {
    let allowed_origins = std::env::var("CORS_ALLOWED_ORIGINS").ok();

    match allowed_origins {
        Some(origins) => {
            let origins: Vec<_> = origins
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();

            if origins.is_empty() {
                tracing::warn!(
                    "CORS_ALLOWED_ORIGINS is set but empty, using permissive CORS (not recommended for production)"
                );
                CorsLayer::permissive()
            } else {
                tracing::info!("CORS configured for origins: {:?}", origins);
                CorsLayer::new()
                    .allow_origin(AllowOrigin::list(origins))
                    .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                    .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
                    .allow_credentials(true)
            }
        }
        None => {
            tracing::warn!(
                "CORS_ALLOWED_ORIGINS not set, using permissive CORS (not recommended for production)"
            );
            CorsLayer::permissive()
        }
    }
}

//! Axum server setup
//!
//! - CORS limited to configured origins (localhost by default)
//! - Tracing middleware
//! - Uploaded photos served from the upload directory
//! - Hourly purge of dead sessions
//! - Graceful shutdown on SIGTERM/Ctrl+C

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use amity_core::AmityConfig;
use axum::http::HeaderValue;
use axum::Router;
use sqlx::PgPool;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use super::routes;
use crate::auth::{AuthError, TokenKeys};
use crate::db::repos::SessionRepo;
use crate::events::EventHub;
use crate::geo::{GeoError, HttpZipLookup, ZipLookup};
use crate::uploads::{UploadError, UploadStore, PUBLIC_PREFIX};

const SESSION_PURGE_INTERVAL: Duration = Duration::from_secs(60 * 60);

const DEFAULT_ORIGINS: [&str; 4] = [
    "http://localhost:3000",
    "http://localhost:3030",
    "http://127.0.0.1:3000",
    "http://127.0.0.1:3030",
];

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to (default: 127.0.0.1:3030)
    pub bind_addr: SocketAddr,

    /// Allow permissive CORS (default: false = listed origins only)
    ///
    /// WARNING: Setting this to true allows any origin.
    pub cors_permissive: bool,

    /// Allowed origins; localhost when empty
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3030)),
            cors_permissive: false,
            cors_origins: Vec::new(),
        }
    }
}

impl ServerConfig {
    pub fn from_config(config: &AmityConfig) -> Result<Self, ServerError> {
        let bind_addr = config
            .server
            .bind
            .parse()
            .map_err(|_| ServerError::InvalidBind(config.server.bind.clone()))?;

        Ok(Self {
            bind_addr,
            cors_permissive: config.server.cors_permissive,
            cors_origins: config.server.cors_origins.clone(),
        })
    }

    fn cors_layer(&self) -> Result<CorsLayer, ServerError> {
        if self.cors_permissive {
            tracing::warn!("CORS: Permissive mode enabled - all origins allowed");
            return Ok(CorsLayer::permissive());
        }

        let origins: Vec<&str> = if self.cors_origins.is_empty() {
            DEFAULT_ORIGINS.to_vec()
        } else {
            self.cors_origins.iter().map(String::as_str).collect()
        };

        let origins = origins
            .into_iter()
            .map(|o| {
                o.parse::<HeaderValue>()
                    .map_err(|_| ServerError::InvalidOrigin(o.to_owned()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any))
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub tokens: TokenKeys,
    pub events: EventHub,
    pub uploads: UploadStore,
    pub geo: Arc<dyn ZipLookup>,
    /// Lifetime of a login session
    pub session_ttl: chrono::Duration,
}

impl AppState {
    /// Build state from loaded config.
    pub fn from_config(pool: PgPool, config: &AmityConfig) -> Result<Self, ServerError> {
        let geo = HttpZipLookup::new(
            &config.geo.zip_lookup_url,
            Duration::from_secs(config.geo.timeout_secs),
        )?;

        Ok(Self {
            pool,
            tokens: TokenKeys::from_config(&config.auth)?,
            events: EventHub::new(),
            uploads: UploadStore::new(&config.uploads.dir, config.uploads.max_bytes),
            geo: Arc::new(geo),
            session_ttl: chrono::Duration::seconds(
                i64::try_from(config.auth.session_ttl_secs)
                    .unwrap_or(i64::MAX)
                    .min(i64::MAX / 1000),
            ),
        })
    }
}

/// Build the application router.
pub fn router(state: Arc<AppState>, config: &ServerConfig) -> Result<Router, ServerError> {
    let cors = config.cors_layer()?;
    let upload_limit = state.uploads.max_bytes();
    let uploads = ServeDir::new(state.uploads.dir());

    Ok(Router::new()
        .merge(routes::health::router())
        .merge(routes::auth::router())
        .merge(routes::users::router(upload_limit))
        .merge(routes::preferences::router())
        .merge(routes::connections::router())
        .merge(routes::notifications::router())
        .merge(routes::chat::router())
        .merge(routes::geo::router())
        .merge(routes::events::router())
        .nest_service(PUBLIC_PREFIX, uploads)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}

/// Run the HTTP server.
///
/// # Example
///
/// ```ignore
/// let pool = create_pool(&database_url).await?;
/// let state = AppState::from_config(pool, &config)?;
/// run_server(state, ServerConfig::from_config(&config)?).await?;
/// ```
pub async fn run_server(state: AppState, config: ServerConfig) -> Result<(), ServerError> {
    state.uploads.ensure_dir().await?;
    tracing::info!(uploads = %state.uploads.dir().display(), "upload directory ready");

    let purge = tokio::spawn(purge_sessions(state.pool.clone()));
    let app = router(Arc::new(state), &config)?;

    let listener = TcpListener::bind(config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;
    purge.abort();
    served?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Delete dead sessions every `SESSION_PURGE_INTERVAL` until aborted.
async fn purge_sessions(pool: PgPool) {
    let mut ticker = tokio::time::interval(SESSION_PURGE_INTERVAL);
    loop {
        ticker.tick().await;
        match SessionRepo::new(&pool).purge_expired(false).await {
            Ok(0) => {}
            Ok(purged) => tracing::info!(purged, "expired sessions purged"),
            Err(e) => tracing::warn!("session purge failed: {}", e),
        }
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting shutdown");
        }
    }
}

/// Server error type
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid bind address '{0}'")]
    InvalidBind(String),

    #[error("invalid CORS origin '{0}'")]
    InvalidOrigin(String),

    #[error("auth setup failed: {0}")]
    Auth(#[from] AuthError),

    #[error("geo lookup setup failed: {0}")]
    Geo(#[from] GeoError),

    #[error("upload directory: {0}")]
    Upload(#[from] UploadError),
}

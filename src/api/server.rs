//! HTTP Server implementation
//!
//! Axum server with configurable host/port binding, graceful shutdown,
//! CORS support, request tracing, and the API key gate on the export route.

use crate::api::handlers::{export, health_check, AppState};
use crate::api::middleware::{api_key_middleware, trace_id_middleware, ApiKeyConfig};
use crate::core::config::ServerConfig;
use crate::core::Config;
use crate::db::{Database, ExportRepository};
use axum::{
    extract::Request,
    middleware::{self, Next},
    routing::get,
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

/// HTTP API Server
pub struct ApiServer {
    router: Router,
    config: ServerConfig,
}

impl ApiServer {
    /// Create a new API server with the given configuration and database
    pub fn new(config: Config, db: Arc<Database>) -> Self {
        let server_config = config.server.clone();
        let router = Self::build_router(config, db);

        Self {
            router,
            config: server_config,
        }
    }

    /// Build the Axum router with all routes and middleware
    fn build_router(config: Config, db: Arc<Database>) -> Router {
        let api_key = ApiKeyConfig::new(
            config.security.api_key_required,
            config.security.api_key.clone(),
            config.security.api_key_header.clone(),
        );
        let allowed_origins = config.security.allowed_origins.clone();

        let state = AppState {
            export_repo: Arc::new(ExportRepository::new(db.clone())),
            db,
        };

        // Public routes (no API key required)
        let public_router = Router::new()
            .route("/health", get(health_check))
            .with_state(state.clone());

        // The export route sits behind the API key check
        let protected_router = Router::new()
            .route("/export", get(export))
            .with_state(state)
            .layer(middleware::from_fn(move |mut req: Request, next: Next| {
                let api_key = api_key.clone();
                async move {
                    // Inject key configuration into request extensions
                    req.extensions_mut().insert(api_key);
                    api_key_middleware(req, next).await
                }
            }));

        Router::new()
            .merge(public_router)
            .merge(protected_router)
            .layer(
                ServiceBuilder::new()
                    // Trace ID middleware for request tracking
                    .layer(middleware::from_fn(trace_id_middleware))
                    // Request/response tracing
                    .layer(TraceLayer::new_for_http())
                    // CORS support
                    .layer(Self::build_cors_layer(&allowed_origins)),
            )
    }

    /// Build CORS layer from allowed origins configuration
    fn build_cors_layer(allowed_origins: &[String]) -> CorsLayer {
        use tower_http::cors::Any;

        let cors = CorsLayer::new();

        if allowed_origins.contains(&"*".to_string()) {
            cors.allow_origin(Any).allow_methods(Any).allow_headers(Any)
        } else {
            let origins: Vec<axum::http::HeaderValue> = allowed_origins
                .iter()
                .filter_map(|origin| origin.parse().ok())
                .collect();

            cors.allow_origin(origins).allow_methods(Any).allow_headers(Any)
        }
    }

    /// Start the HTTP server and listen for requests
    ///
    /// This method will block until the server is shut down gracefully.
    pub async fn serve(self) -> anyhow::Result<()> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let socket_addr: SocketAddr = addr.parse()?;

        let listener = tokio::net::TcpListener::bind(socket_addr).await?;

        info!(addr = %socket_addr, "HTTP server listening");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("HTTP server shut down gracefully");

        Ok(())
    }

    /// Take the router, for driving the service in tests without binding a
    /// socket
    pub fn into_router(self) -> Router {
        self.router
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }

    info!("Initiating graceful shutdown...");
}

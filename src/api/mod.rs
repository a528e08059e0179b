//! Minimal read-only status API (feature `api`).
//!
//! Grounded on the teacher's `src/api/mod.rs` + `routes/{health,stats}.rs`
//! (axum `Router` construction, `ApiState`, CORS layer, `spawn_api_server`
//! returning the bound `SocketAddr`) narrowed to three read-only routes:
//! `GET /status`, `GET /health`, `POST /health-check`.
//!
//! ## Endpoints
//! - `GET /api/v1/health` — liveness probe
//! - `POST /api/v1/health-check` — force an immediate health check
//! - `GET /api/v1/status` — `GetStatus()` snapshot

pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use state::ApiState;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tracing::info;

use crate::manager::SchedulerManager;

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub bind_addr: SocketAddr,
    pub auth_token: Option<String>,
    pub enable_cors: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".parse().unwrap(),
            auth_token: None,
            enable_cors: true,
        }
    }
}

/// Builds the router and binds it, spawning the server in a background task.
/// Returns the address actually bound (useful when `bind_addr`'s port is 0).
pub async fn spawn_api_server(
    config: ApiConfig,
    manager: Arc<SchedulerManager>,
) -> anyhow::Result<SocketAddr> {
    use tower_http::cors::{Any, CorsLayer};
    use tower_http::trace::TraceLayer;

    info!("starting status API on {}", config.bind_addr);

    let state = ApiState { manager };

    let mut app = Router::new()
        .route("/api/v1/health", get(routes::health::health_check))
        .route("/api/v1/health-check", post(routes::health::force_health_check))
        .route("/api/v1/status", get(routes::status::get_status))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if config.enable_cors {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        app = app.layer(cors);
    }

    if let Some(token) = config.auth_token {
        app = app.layer(axum::middleware::from_fn_with_state(
            token,
            middleware::auth::auth_middleware,
        ));
    }

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    let addr = listener.local_addr()?;
    info!("status API listening on {}", addr);

    tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, app).await {
            tracing::error!(error = %err, "status API server error");
        }
    });

    Ok(addr)
}

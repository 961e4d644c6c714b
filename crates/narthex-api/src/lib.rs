//! # narthex-api: HTTP Key Registration Service
//!
//! Serves the first-come-first-served key registry over HTTP, built on
//! Axum/Tower/Tokio. The registration logic itself lives in
//! [`narthex_core`]; this crate maps it onto routes, status codes, and the
//! server process.
//!
//! ## Routes
//!
//! - `PUT /register/{id}`: register the request body as key `id`
//!   (201/400/405/409/500, always with an empty body).
//! - `/health/*`: liveness and readiness probes.
//!
//! ## Middleware Stack (Tower)
//!
//! Server header → TraceLayer → Metrics → (registration only) virtual host
//! filter → body limit
//!
//! ## Crate Policy
//!
//! - No registration logic in route handlers; they delegate to the
//!   [`narthex_core::Registrar`].
//! - Serving-layer errors map to bodiless HTTP responses via `AppError`.

pub mod bootstrap;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;

pub use error::AppError;
pub use state::{AppState, ServerConfig};

use axum::extract::{DefaultBodyLimit, State};
use axum::http::header::SERVER;
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::from_fn;
use axum::routing::get;
use axum::{Extension, Router};
use tower_http::set_header::SetResponseHeaderLayer;

use crate::middleware::host::{virtual_host_middleware, VirtualHost};

/// Value of the `Server` response header.
pub const SERVER_NAME: &str = "narthex";

/// Build the application router.
pub fn app(state: AppState) -> Router {
    let vhost = VirtualHost::new(state.config.domain.as_deref());

    let api = Router::new()
        .merge(routes::register::router())
        .layer(DefaultBodyLimit::max(state.config.body_limit))
        .layer(from_fn(virtual_host_middleware))
        .layer(Extension(vhost))
        .with_state(state.clone());

    // Health probes answer on any host.
    let health = Router::new()
        .route("/health/liveness", get(liveness))
        .route("/health/readiness", get(readiness))
        .with_state(state);

    Router::new()
        .merge(health)
        .merge(api)
        .layer(from_fn(middleware::metrics::metrics_middleware))
        .layer(middleware::tracing_layer::layer())
        .layer(SetResponseHeaderLayer::if_not_present(
            SERVER,
            HeaderValue::from_static(SERVER_NAME),
        ))
}

/// Liveness probe: always returns 200 if the process is running.
async fn liveness() -> &'static str {
    "ok"
}

/// Readiness probe: 200 while the key directory is a writable directory,
/// 503 otherwise.
async fn readiness(State(state): State<AppState>) -> Result<&'static str, StatusCode> {
    let root = state.registrar.store().root().to_path_buf();
    match tokio::fs::metadata(&root).await {
        Ok(meta) if meta.is_dir() && !meta.permissions().readonly() => Ok("ready"),
        Ok(_) => {
            tracing::warn!(key_dir = %root.display(), "key directory is not a writable directory");
            Err(StatusCode::SERVICE_UNAVAILABLE)
        }
        Err(e) => {
            tracing::warn!(key_dir = %root.display(), error = %e, "key directory unavailable");
            Err(StatusCode::SERVICE_UNAVAILABLE)
        }
    }
}

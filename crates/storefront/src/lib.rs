//! EC Space storefront library.
//!
//! Catalog, persistent carts, credit balances, and the atomic checkout
//! engine, exposed as a JSON API by the `ec-space-storefront` binary.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;

use axum::{
    Router,
    extract::{Request, State},
    http::StatusCode,
    middleware as axum_middleware,
    routing::get,
};
use tower_http::trace::TraceLayer;

use crate::middleware::RateLimiterError;
use crate::state::AppState;

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
pub async fn health() -> &'static str {
    "ok"
}

/// Readiness health check endpoint.
///
/// Returns 503 Service Unavailable if the database is not reachable.
pub async fn readiness(State(state): State<AppState>) -> StatusCode {
    match sqlx::query("SELECT 1").fetch_one(state.pool()).await {
        Ok(_) => StatusCode::OK,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// Assemble the full application router.
///
/// Sentry layers are left to the binary so tests can build the router
/// without a Sentry client.
///
/// # Errors
///
/// Returns an error if a rate limiter cannot be configured.
pub fn app(state: AppState) -> Result<Router, RateLimiterError> {
    let auth_limiter = middleware::auth_rate_limiter().ok_or(RateLimiterError)?;
    let api_limiter = middleware::api_rate_limiter().ok_or(RateLimiterError)?;
    let session_layer = middleware::create_session_layer(state.pool(), state.config());

    let api = Router::new()
        .nest("/auth", routes::auth_routes().layer(auth_limiter))
        .merge(routes::api_routes().layer(api_limiter));

    Ok(Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .nest("/api", api)
        .layer(session_layer)
        .layer(axum_middleware::from_fn(middleware::security_headers_middleware))
        .layer(axum_middleware::from_fn(middleware::request_id_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(|request: &Request| {
            tracing::info_span!(
                "http_request",
                method = %request.method(),
                uri = %request.uri(),
                request_id = tracing::field::Empty,
            )
        }))
        .with_state(state))
}

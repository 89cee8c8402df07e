//! HTTP API routes and handlers.
//!
//! This module contains all HTTP endpoint implementations organized by domain:
//! - `health` - Service health checks
//! - `session` - Band connection, live display state and fall alert cancel
//! - `caregiver` - Caregiver contact storage
//! - `error` - API error types
//! - `openapi` - OpenAPI specification generation

use axum::routing::get;
use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::SharedState;

pub mod caregiver;
pub mod error;
pub mod health;
pub mod openapi;
pub mod session;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::{ApiError, ApiResult, ErrorResponse};
pub use openapi::get_openapi_json;

/// Creates the combined API router with all endpoints.
///
/// # Route Structure
///
/// ```text
/// /health                - Health check
/// /api
/// ├── /session           - Display state
/// │   └── /toggle        - Connect or disconnect
/// ├── /alert/cancel      - Cancel the fall countdown
/// ├── /caregiver         - Caregiver contact (GET, PUT)
/// └── /openapi.json      - OpenAPI specification
/// ```
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .nest("/health", health::router())
        .nest(
            "/api",
            Router::new()
                .nest("/session", session::router())
                .nest("/alert", session::alert_router())
                .nest("/caregiver", caregiver::router())
                .route("/openapi.json", get(openapi::get_openapi_spec)),
        )
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

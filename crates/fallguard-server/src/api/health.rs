//! Liveness endpoint reporting the build version and band link state.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use fallguard_core::ConnectionState;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::state::SharedState;

/// Liveness report.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "status": "ok",
    "version": "0.1.0",
    "connection": "connected"
}))]
pub struct HealthResponse {
    /// Always `ok` while the HTTP server answers.
    #[schema(example = "ok")]
    pub status: String,

    /// Crate version of the running binary.
    #[schema(example = "0.1.0")]
    pub version: String,

    /// Current state of the link to the band.
    pub connection: ConnectionState,
}

/// Routes for `/health`.
pub fn router() -> Router<SharedState> {
    Router::new().route("/", get(health_check))
}

/// Report liveness along with the session's connection state.
///
/// A disconnected band does not make the service unhealthy.
#[utoipa::path(
    get,
    path = "/health",
    tag = "system",
    operation_id = "healthCheck",
    summary = "Check bridge liveness",
    description = "Answers `ok` whenever the server is up, together with the \
        version and whether the band is linked. Band state never changes the \
        status code.",
    responses(
        (status = 200, description = "Bridge is up", body = HealthResponse)
    )
)]
pub async fn health_check(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        connection: state.session.display().connection,
    })
}

//! Band session API endpoints.
//!
//! Exposes the session's display state, the connect/disconnect toggle and the
//! fall alert cancel control.

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use fallguard_core::{ConnectionState, DisplayState};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::api::error::ApiResult;
use crate::state::SharedState;

/// Creates the session router.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(get_session))
        .route("/toggle", post(toggle_connection))
}

/// Creates the alert router.
pub fn alert_router() -> Router<SharedState> {
    Router::new().route("/cancel", post(cancel_alert))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Response after toggling the connection.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "connection": "connecting",
    "display": {
        "connection": "connecting",
        "status": "Status: Connecting...",
        "toggle_label": "Connect to Band",
        "heart_rate": "--",
        "steps": "--",
        "latitude": "--",
        "longitude": "--",
        "map_link": null,
        "countdown": null
    }
}))]
pub struct ToggleResponse {
    /// State after the toggle was applied.
    pub connection: ConnectionState,

    /// Display published by the toggle itself.
    pub display: DisplayState,
}

/// Response after a cancel request.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({ "cancelled": true }))]
pub struct CancelAlertResponse {
    /// Whether a running countdown was stopped.
    #[schema(example = true)]
    pub cancelled: bool,
}

// ============================================================================
// Handlers
// ============================================================================

/// Get the current display state.
#[utoipa::path(
    get,
    path = "/api/session",
    tag = "session",
    operation_id = "getSession",
    summary = "Get band session state",
    description = "Returns what the display should show: connection status, the \
        latest readings (`--` when not reported), the map link and the fall \
        countdown while one is running.",
    responses(
        (status = 200, description = "Current display state", body = DisplayState)
    )
)]
pub async fn get_session(State(state): State<SharedState>) -> Json<DisplayState> {
    Json(state.session.display())
}

/// Connect to or disconnect from the band.
#[utoipa::path(
    post,
    path = "/api/session/toggle",
    tag = "session",
    operation_id = "toggleConnection",
    summary = "Connect or disconnect",
    description = "When disconnected, starts discovery and subscription and returns \
        `connecting`; poll `GET /api/session` for the outcome. When connected, \
        disconnects immediately. Ignored while a connection attempt is in progress.",
    responses(
        (status = 200, description = "Toggle applied", body = ToggleResponse),
        (status = 503, description = "Session not running", body = super::error::ErrorResponse)
    )
)]
pub async fn toggle_connection(State(state): State<SharedState>) -> ApiResult<Json<ToggleResponse>> {
    let display = state.session.request_toggle().await?;
    let connection = &display.connection;
    tracing::info!(connection = %connection, "Connection toggled via API");

    Ok(Json(ToggleResponse {
        connection: display.connection,
        display,
    }))
}

/// Cancel a running fall countdown.
#[utoipa::path(
    post,
    path = "/api/alert/cancel",
    tag = "alert",
    operation_id = "cancelAlert",
    summary = "Cancel the fall alert",
    description = "Stops the fall countdown so no alert is sent. Returns \
        `cancelled: false` if no countdown was running or the alert was already sent.",
    responses(
        (status = 200, description = "Cancel processed", body = CancelAlertResponse),
        (status = 503, description = "Session not running", body = super::error::ErrorResponse)
    )
)]
pub async fn cancel_alert(State(state): State<SharedState>) -> ApiResult<Json<CancelAlertResponse>> {
    let cancelled = state.session.cancel_alert().await?;
    if cancelled {
        tracing::info!("Fall alert cancelled via API");
    }

    Ok(Json(CancelAlertResponse { cancelled }))
}

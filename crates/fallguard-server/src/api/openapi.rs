//! OpenAPI specification generation for the fallguard API.
//!
//! Served at `/api/openapi.json` and written to disk by the `gen-openapi` binary
//! for front-end client generation.

use axum::Json;
use fallguard_core::{CaregiverContact, ConnectionState, DisplayState};
use utoipa::OpenApi;

use super::caregiver::SaveCaregiverResponse;
use super::error::ErrorResponse;
use super::health::HealthResponse;
use super::session::{CancelAlertResponse, ToggleResponse};

/// Serve the OpenAPI specification as JSON.
///
/// This endpoint is available at `/api/openapi.json` and returns the complete
/// OpenAPI 3.0 specification for the fallguard API.
pub async fn get_openapi_spec() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Returns the OpenAPI specification as a pretty-printed string.
///
/// # Errors
///
/// Returns an error if the document cannot be serialized.
pub fn get_openapi_json() -> serde_json::Result<String> {
    ApiDoc::openapi().to_pretty_json()
}

/// Main OpenAPI document structure for fallguard.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "fallguard API",
        version = "0.1.0",
        description = r#"
# fallguard API

fallguard bridges a wearable health band to a caregiver alert webhook.

## Overview

1. **Session**: Connect to the band and read its latest heart rate, steps and position
2. **Fall alerts**: When the band reports a fall, a countdown starts. Unless it is
   cancelled, the alert is posted to the configured webhook with the caregiver contact
3. **Caregiver**: Store who should be notified

Poll `GET /api/session` to follow connection progress and the fall countdown.
"#,
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "/", description = "Local fallguard server")
    ),
    tags(
        (name = "system", description = "Health checks"),
        (name = "session", description = "Band connection and live telemetry"),
        (name = "alert", description = "Fall alert countdown control"),
        (name = "caregiver", description = "Caregiver contact attached to every alert")
    ),
    paths(
        super::health::health_check,
        super::session::get_session,
        super::session::toggle_connection,
        super::session::cancel_alert,
        super::caregiver::get_caregiver,
        super::caregiver::update_caregiver,
    ),
    components(
        schemas(
            ErrorResponse,
            HealthResponse,
            ConnectionState,
            DisplayState,
            ToggleResponse,
            CancelAlertResponse,
            CaregiverContact,
            SaveCaregiverResponse,
        )
    )
)]
pub struct ApiDoc;

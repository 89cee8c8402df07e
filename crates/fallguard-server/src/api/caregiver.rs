//! Caregiver contact API endpoints.
//!
//! The stored contact is read again whenever a fall alert is dispatched, so an
//! update applies to any countdown already running.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use fallguard_core::CaregiverContact;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::api::error::ApiResult;
use crate::state::SharedState;

/// Confirmation shown after a successful save.
pub const SAVED_STATUS: &str = "Saved!";

/// Creates the caregiver router.
pub fn router() -> Router<SharedState> {
    Router::new().route("/", get(get_caregiver).put(update_caregiver))
}

/// Response after saving the caregiver contact.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "status": "Saved!",
    "caregiver": {
        "name": "Priya Sharma",
        "mobile": "+44 7700 900123",
        "email": "priya@example.com"
    }
}))]
pub struct SaveCaregiverResponse {
    /// Confirmation text.
    #[schema(example = "Saved!")]
    pub status: String,

    /// The contact as stored, trimmed.
    pub caregiver: CaregiverContact,
}

/// Get the stored caregiver contact.
#[utoipa::path(
    get,
    path = "/api/caregiver",
    tag = "caregiver",
    operation_id = "getCaregiver",
    summary = "Get caregiver contact",
    description = "Returns the stored contact. Fields that were never set are empty \
        strings; alerts substitute `Not Provided` for them.",
    responses(
        (status = 200, description = "Stored contact", body = CaregiverContact)
    )
)]
pub async fn get_caregiver(State(state): State<SharedState>) -> Json<CaregiverContact> {
    Json(state.contacts.get())
}

/// Save the caregiver contact.
#[utoipa::path(
    put,
    path = "/api/caregiver",
    tag = "caregiver",
    operation_id = "updateCaregiver",
    summary = "Save caregiver contact",
    description = "Trims and stores the contact. Missing fields are stored as empty.",
    request_body = CaregiverContact,
    responses(
        (status = 200, description = "Contact saved", body = SaveCaregiverResponse),
        (status = 500, description = "Contact could not be written", body = super::error::ErrorResponse)
    )
)]
pub async fn update_caregiver(
    State(state): State<SharedState>,
    Json(contact): Json<CaregiverContact>,
) -> ApiResult<Json<SaveCaregiverResponse>> {
    let caregiver = state.contacts.put(&contact)?;
    tracing::info!(name = %caregiver.name, "Caregiver contact updated");

    Ok(Json(SaveCaregiverResponse {
        status: SAVED_STATUS.to_string(),
        caregiver,
    }))
}

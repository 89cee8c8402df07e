//! Application state shared across handlers.

use std::sync::Arc;

use fallguard_core::{ContactStore, SessionHandle};

/// Shared application state.
pub type SharedState = Arc<AppState>;

/// Handles the HTTP layer needs.
///
/// The session owns all mutable telemetry state; handlers only send it
/// commands and read its published display state.
pub struct AppState {
    /// Handle to the running band session.
    pub session: SessionHandle,

    /// Caregiver contact storage.
    pub contacts: Arc<dyn ContactStore>,
}

impl AppState {
    /// Bundle the session handle and contact store.
    #[must_use]
    pub fn new(session: SessionHandle, contacts: Arc<dyn ContactStore>) -> Self {
        Self { session, contacts }
    }

    /// Wrap in an [`Arc`] for use as router state.
    #[must_use]
    pub fn shared(self) -> SharedState {
        Arc::new(self)
    }
}

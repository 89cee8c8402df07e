//! Error type surfaced across the crate boundary.
//!
//! Link, frame and delivery failures stay inside the session: they end up on the
//! status line or in the logs, never as a returned error. What callers of the
//! library can actually receive is collected in [`FallguardError`]. Module errors
//! (`ConfigError`, `ContactStoreError`) remain available for finer handling.
//!
//! # Example
//!
//! ```rust
//! use fallguard_core::error::{FallguardError, Result};
//!
//! fn require_session(running: bool) -> Result<()> {
//!     if !running {
//!         return Err(FallguardError::SessionClosed);
//!     }
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// Errors returned to users of the fallguard library.
#[derive(Debug, Error)]
pub enum FallguardError {
    // =========================================================================
    // SESSION ERRORS
    // =========================================================================
    /// The session task is no longer running.
    #[error("Telemetry session is not running")]
    SessionClosed,

    // =========================================================================
    // PERSISTENCE ERRORS
    // =========================================================================
    /// The caregiver contact could not be read or written.
    #[error("Persistence error: {0}")]
    PersistenceError(String),
}

/// A specialized [`Result`] type for fallguard operations.
pub type Result<T> = std::result::Result<T, FallguardError>;

/// Shorthand alias for [`FallguardError`].
pub type Error = FallguardError;

impl FallguardError {
    /// Returns an HTTP-appropriate status code for this error.
    #[inline]
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            Self::PersistenceError(_) => 500,
            Self::SessionClosed => 503,
        }
    }

    /// Returns a machine-readable error code for API responses.
    #[inline]
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::SessionClosed => "SESSION_CLOSED",
            Self::PersistenceError(_) => "PERSISTENCE_ERROR",
        }
    }
}

impl From<crate::contacts::ContactStoreError> for FallguardError {
    fn from(err: crate::contacts::ContactStoreError) -> Self {
        use crate::contacts::ContactStoreError;
        match err {
            ContactStoreError::ReadError { path, source } => {
                Self::PersistenceError(format!("Failed to read {}: {}", path.display(), source))
            }
            ContactStoreError::WriteError { path, source } => {
                Self::PersistenceError(format!("Failed to write {}: {}", path.display(), source))
            }
            ContactStoreError::ParseError { path, source } => {
                Self::PersistenceError(format!("Failed to parse {}: {}", path.display(), source))
            }
            ContactStoreError::SerializeError(e) => Self::PersistenceError(e.to_string()),
            ContactStoreError::CreateDirError { path, source } => Self::PersistenceError(format!(
                "Failed to create directory {}: {}",
                path.display(),
                source
            )),
        }
    }
}

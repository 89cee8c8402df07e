//! Shared types and OpenAPI schemas.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// State of the link to the band.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No link. The initial state.
    #[default]
    Disconnected,
    /// Discovery and subscription in progress.
    Connecting,
    /// Subscribed to the telemetry characteristic.
    Connected,
}

impl ConnectionState {
    /// Label for the connect/disconnect control.
    #[must_use]
    pub const fn toggle_label(self) -> &'static str {
        match self {
            Self::Connected => "Disconnect",
            Self::Disconnected | Self::Connecting => "Connect to Band",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => f.write_str("disconnected"),
            Self::Connecting => f.write_str("connecting"),
            Self::Connected => f.write_str("connected"),
        }
    }
}

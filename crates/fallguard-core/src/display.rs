//! Display projection published by the session.
//!
//! Everything a front end needs to render: status line, latest readings with
//! `--` placeholders, the map link and the fall countdown.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use crate::frame::{keys, TelemetryRecord};
use crate::types::ConnectionState;

/// Shown for any reading the band has not reported.
pub const PLACEHOLDER: &str = "--";

/// Snapshot of what the display surface should show.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "connection": "connected",
    "status": "Status: Connected",
    "toggle_label": "Disconnect",
    "heart_rate": "72",
    "steps": "100",
    "latitude": "51.5072",
    "longitude": "-0.1276",
    "map_link": "https://www.google.com/maps?q=51.5072,-0.1276",
    "countdown": null
}))]
pub struct DisplayState {
    /// Current connection state.
    pub connection: ConnectionState,

    /// Status line, e.g. `Status: Connected` or `Status: Error: ...`.
    pub status: String,

    /// Label for the connect/disconnect control.
    pub toggle_label: String,

    /// Heart rate or `--`.
    pub heart_rate: String,

    /// Step count or `--`.
    pub steps: String,

    /// Latitude or `--`.
    pub latitude: String,

    /// Longitude or `--`.
    pub longitude: String,

    /// Map link, present once the band reported a position.
    pub map_link: Option<String>,

    /// Seconds left before the fall alert is sent; present only while armed.
    pub countdown: Option<u32>,
}

impl Default for DisplayState {
    fn default() -> Self {
        let connection = ConnectionState::Disconnected;
        Self {
            connection,
            status: status_line("Disconnected"),
            toggle_label: connection.toggle_label().to_string(),
            heart_rate: PLACEHOLDER.to_string(),
            steps: PLACEHOLDER.to_string(),
            latitude: PLACEHOLDER.to_string(),
            longitude: PLACEHOLDER.to_string(),
            map_link: None,
            countdown: None,
        }
    }
}

impl DisplayState {
    /// Update the status line and toggle label.
    pub fn set_connection(&mut self, connection: ConnectionState, message: &str) {
        self.connection = connection;
        self.status = status_line(message);
        self.toggle_label = connection.toggle_label().to_string();
    }

    /// Show the readings of a freshly decoded record.
    ///
    /// A reading that was not a number is shown as sent. The map link only
    /// changes when the record carries a position.
    pub fn show_record(&mut self, record: &TelemetryRecord) {
        self.heart_rate = reading(record, record.heart_rate, keys::HEART_RATE);
        self.steps = reading(record, record.step_count, keys::STEPS);
        self.latitude = reading(record, record.latitude, keys::LATITUDE);
        self.longitude = reading(record, record.longitude, keys::LONGITUDE);

        if let Some((lat, lon)) = record.position() {
            self.map_link = Some(map_link(lat, lon));
        }
    }

    /// Put every reading back to its placeholder and hide the map link.
    pub fn reset_metrics(&mut self) {
        self.heart_rate = PLACEHOLDER.to_string();
        self.steps = PLACEHOLDER.to_string();
        self.latitude = PLACEHOLDER.to_string();
        self.longitude = PLACEHOLDER.to_string();
        self.map_link = None;
    }
}

fn status_line(message: &str) -> String {
    format!("Status: {message}")
}

fn reading<T: ToString>(record: &TelemetryRecord, value: Option<T>, key: &str) -> String {
    if let Some(value) = value {
        return value.to_string();
    }
    match record.raw(key) {
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
        None => PLACEHOLDER.to_string(),
    }
}

/// Google Maps link for a position.
#[must_use]
pub fn map_link(latitude: f64, longitude: f64) -> String {
    format!("https://www.google.com/maps?q={latitude},{longitude}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::decode;

    #[test]
    fn test_default_shows_placeholders() {
        let display = DisplayState::default();
        assert_eq!(display.status, "Status: Disconnected");
        assert_eq!(display.toggle_label, "Connect to Band");
        assert_eq!(display.heart_rate, "--");
        assert_eq!(display.steps, "--");
        assert!(display.map_link.is_none());
        assert!(display.countdown.is_none());
    }

    #[test]
    fn test_show_record_formats_readings() {
        let mut display = DisplayState::default();
        display.show_record(&decode(br#"{"bpm":72,"steps":100,"lat":12.5,"lon":-3}"#).unwrap());

        assert_eq!(display.heart_rate, "72");
        assert_eq!(display.steps, "100");
        assert_eq!(display.latitude, "12.5");
        assert_eq!(display.longitude, "-3");
        assert_eq!(
            display.map_link.as_deref(),
            Some("https://www.google.com/maps?q=12.5,-3")
        );
    }

    #[test]
    fn test_missing_readings_fall_back_to_placeholder() {
        let mut display = DisplayState::default();
        display.show_record(&decode(br#"{"bpm":72,"steps":100}"#).unwrap());
        display.show_record(&decode(br#"{"steps":101}"#).unwrap());

        assert_eq!(display.heart_rate, "--");
        assert_eq!(display.steps, "101");
    }

    #[test]
    fn test_non_numeric_readings_shown_as_sent() {
        let mut display = DisplayState::default();
        display.show_record(&decode(br#"{"bpm":"high","steps":12.5,"lat":"n/a","lon":null}"#).unwrap());

        assert_eq!(display.heart_rate, "high");
        assert_eq!(display.steps, "12.5");
        assert_eq!(display.latitude, "n/a");
        assert_eq!(display.longitude, "--");
        assert!(display.map_link.is_none());
    }

    #[test]
    fn test_map_link_survives_frames_without_position() {
        let mut display = DisplayState::default();
        display.show_record(&decode(br#"{"lat":1.5,"lon":2.5}"#).unwrap());
        display.show_record(&decode(br#"{"bpm":80}"#).unwrap());

        assert!(display.map_link.is_some());
        assert_eq!(display.latitude, "--");
    }

    #[test]
    fn test_reset_metrics_hides_map() {
        let mut display = DisplayState::default();
        display.show_record(&decode(br#"{"bpm":72,"lat":1.5,"lon":2.5}"#).unwrap());
        display.reset_metrics();

        assert_eq!(display.heart_rate, "--");
        assert_eq!(display.latitude, "--");
        assert!(display.map_link.is_none());
    }

    #[test]
    fn test_set_connection_updates_label() {
        let mut display = DisplayState::default();
        display.set_connection(ConnectionState::Connected, "Connected");
        assert_eq!(display.status, "Status: Connected");
        assert_eq!(display.toggle_label, "Disconnect");
    }
}

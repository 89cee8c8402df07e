//! Telemetry frame decoding.
//!
//! The band pushes one JSON object per GATT notification:
//!
//! ```json
//! {"bpm": 72, "steps": 1043, "lat": 51.5072, "lon": -0.1276, "fall": false}
//! ```
//!
//! Every key is optional. Sensor values are passed through untouched even when
//! they are out of range, and a reading that is not a number is kept as sent in
//! [`TelemetryRecord::extra`]. Only undecodable frames are rejected.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// Wire keys used by the band firmware.
pub(crate) mod keys {
    pub const HEART_RATE: &str = "bpm";
    pub const STEPS: &str = "steps";
    pub const LATITUDE: &str = "lat";
    pub const LONGITUDE: &str = "lon";
    pub const FALL: &str = "fall";
    pub const RECEIVED_AT: &str = "received_at";
}

/// Why a frame was rejected.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The frame is not valid UTF-8 text.
    #[error("frame is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    /// The text is not valid JSON.
    #[error("frame is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// The JSON is valid but not an object.
    #[error("frame must be a JSON object, got {found}")]
    NotAnObject {
        /// JSON type that was received instead.
        found: &'static str,
    },
}

/// One decoded telemetry sample.
///
/// Serializes with the band's wire keys so the alert payload carries the same
/// shape the firmware sends. Absent readings are omitted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryRecord {
    /// Heart rate in beats per minute.
    #[serde(rename = "bpm", skip_serializing_if = "Option::is_none")]
    pub heart_rate: Option<i64>,

    /// Step counter.
    #[serde(rename = "steps", skip_serializing_if = "Option::is_none")]
    pub step_count: Option<i64>,

    /// Latitude in degrees.
    #[serde(rename = "lat", skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,

    /// Longitude in degrees.
    #[serde(rename = "lon", skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,

    /// Whether the band flagged a fall.
    #[serde(rename = "fall")]
    pub fall_detected: bool,

    /// When the frame arrived.
    pub received_at: DateTime<Utc>,

    /// Every other key the band sent, including readings that were not numbers.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TelemetryRecord {
    /// The value the band sent for `key` when it was not kept as a number.
    #[must_use]
    pub fn raw(&self, key: &str) -> Option<&Value> {
        self.extra.get(key).filter(|value| !value.is_null())
    }

    /// Both coordinates, when the band reported a non-zero fix.
    #[must_use]
    pub fn position(&self) -> Option<(f64, f64)> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) if lat != 0.0 && lon != 0.0 => Some((lat, lon)),
            _ => None,
        }
    }
}

/// Decode a frame stamped with the current time.
///
/// # Errors
///
/// Returns [`DecodeError`] for non-UTF-8 bytes, invalid JSON, or non-object JSON.
pub fn decode(raw: &[u8]) -> Result<TelemetryRecord, DecodeError> {
    decode_at(raw, Utc::now())
}

/// Decode a frame with an explicit arrival time.
///
/// # Errors
///
/// See [`decode`].
pub fn decode_at(raw: &[u8], received_at: DateTime<Utc>) -> Result<TelemetryRecord, DecodeError> {
    let text = std::str::from_utf8(raw)?;
    let mut fields = match serde_json::from_str::<Value>(text)? {
        Value::Object(fields) => fields,
        other => {
            return Err(DecodeError::NotAnObject {
                found: json_type(&other),
            })
        }
    };

    let heart_rate = take(&mut fields, keys::HEART_RATE, as_integer);
    let step_count = take(&mut fields, keys::STEPS, as_integer);
    let latitude = take(&mut fields, keys::LATITUDE, Value::as_f64);
    let longitude = take(&mut fields, keys::LONGITUDE, Value::as_f64);
    let fall_detected = matches!(fields.remove(keys::FALL), Some(Value::Bool(true)));
    fields.remove(keys::RECEIVED_AT);

    Ok(TelemetryRecord {
        heart_rate,
        step_count,
        latitude,
        longitude,
        fall_detected,
        received_at,
        extra: fields,
    })
}

/// Remove `key` if `parse` accepts its value; otherwise leave it in place.
fn take<T>(
    fields: &mut Map<String, Value>,
    key: &str,
    parse: impl Fn(&Value) -> Option<T>,
) -> Option<T> {
    let value = fields.get(key)?;
    match parse(value) {
        Some(parsed) => {
            fields.remove(key);
            Some(parsed)
        }
        None => {
            if !value.is_null() {
                tracing::debug!(key, value = %value, "Keeping non-numeric telemetry field as sent");
            }
            None
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
fn as_integer(value: &Value) -> Option<i64> {
    value.as_i64().or_else(|| match value.as_f64() {
        Some(f) if f.fract() == 0.0 && f.abs() < 9.0e15 => Some(f as i64),
        _ => None,
    })
}

const fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

//! Alert payload construction and delivery.
//!
//! When a fall countdown expires the [`AlertDispatcher`] reads the caregiver
//! contact as it is right now, builds an [`AlertPayload`] and hands it to an
//! [`AlertSink`] for a single delivery attempt. Failures are logged and dropped.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};
use url::Url;

use crate::contacts::{CaregiverContact, ContactStore};
use crate::frame::TelemetryRecord;

/// Errors raised while delivering an alert.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    /// The request could not be sent or timed out.
    #[error("webhook request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The webhook URL is unusable.
    #[error("invalid webhook URL '{url}': {message}")]
    InvalidUrl {
        /// URL as configured.
        url: String,
        /// Parse failure.
        message: String,
    },
}

/// Result alias for alert delivery.
pub type DispatchResult<T> = std::result::Result<T, DispatchError>;

/// The body posted to the webhook.
///
/// Carries the triggering record's readings at the top level, the caregiver
/// with every blank replaced by `Not Provided`, and the dispatch time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertPayload {
    /// Readings from the frame that triggered the countdown.
    #[serde(flatten)]
    pub record: TelemetryRecord,

    /// Who should be notified.
    pub caregiver: CaregiverContact,

    /// When the alert was dispatched, ISO-8601 with milliseconds.
    pub timestamp: String,
}

impl AlertPayload {
    /// Build a payload for `record` and the stored `contact`.
    #[must_use]
    pub fn new(
        mut record: TelemetryRecord,
        contact: &CaregiverContact,
        dispatched_at: DateTime<Utc>,
    ) -> Self {
        // Band keys never shadow the alert's own fields.
        record.extra.remove("caregiver");
        record.extra.remove("timestamp");
        Self {
            record,
            caregiver: contact.or_not_provided(),
            timestamp: dispatched_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

/// Acknowledgement from a sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReceipt {
    /// HTTP status returned by the endpoint.
    pub status: u16,
}

/// Destination for alert payloads.
#[async_trait::async_trait]
pub trait AlertSink: Send + Sync {
    /// Sink name for logs.
    fn name(&self) -> &str;

    /// Make exactly one delivery attempt.
    async fn deliver(&self, payload: &AlertPayload) -> DispatchResult<DeliveryReceipt>;
}

/// Posts alert payloads as JSON to an HTTP webhook.
#[derive(Debug, Clone)]
pub struct WebhookSink {
    client: reqwest::Client,
    url: Url,
}

impl WebhookSink {
    /// Create a sink for `url` with a per-request `timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the client cannot be built.
    pub fn new(url: &str, timeout: Duration) -> DispatchResult<Self> {
        let url = Url::parse(url).map_err(|e| DispatchError::InvalidUrl {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(DispatchError::Client)?;

        Ok(Self { client, url })
    }

    /// Endpoint alerts are posted to.
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait::async_trait]
impl AlertSink for WebhookSink {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn deliver(&self, payload: &AlertPayload) -> DispatchResult<DeliveryReceipt> {
        let response = self
            .client
            .post(self.url.clone())
            .json(payload)
            .send()
            .await?;

        Ok(DeliveryReceipt {
            status: response.status().as_u16(),
        })
    }
}

/// What happened to a dispatched alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The endpoint answered (any status).
    Delivered {
        /// HTTP status returned.
        status: u16,
    },
    /// The request never got an answer.
    Failed,
}

/// Builds alert payloads and sends them through a sink.
#[derive(Clone)]
pub struct AlertDispatcher {
    sink: Arc<dyn AlertSink>,
    contacts: Arc<dyn ContactStore>,
}

impl AlertDispatcher {
    /// Create a dispatcher reading the caregiver from `contacts`.
    pub fn new(sink: Arc<dyn AlertSink>, contacts: Arc<dyn ContactStore>) -> Self {
        Self { sink, contacts }
    }

    /// Build the payload for `record` and attempt delivery once.
    pub async fn dispatch(&self, record: TelemetryRecord) -> DispatchOutcome {
        let contact = self.contacts.get();
        let payload = AlertPayload::new(record, &contact, Utc::now());

        info!(
            sink = self.sink.name(),
            caregiver = %payload.caregiver.name,
            timestamp = %payload.timestamp,
            "Sending fall alert"
        );

        match self.sink.deliver(&payload).await {
            Ok(receipt) => {
                if (200..300).contains(&receipt.status) {
                    info!(status = receipt.status, "Fall alert delivered");
                } else {
                    warn!(status = receipt.status, "Fall alert endpoint returned non-success status");
                }
                DispatchOutcome::Delivered {
                    status: receipt.status,
                }
            }
            Err(e) => {
                error!(sink = self.sink.name(), error = %e, "Failed to send fall alert");
                DispatchOutcome::Failed
            }
        }
    }
}

impl std::fmt::Debug for AlertDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertDispatcher")
            .field("sink", &self.sink.name())
            .finish_non_exhaustive()
    }
}

/// Sink that records payloads instead of sending them.
#[cfg(any(test, feature = "mock-bluetooth"))]
#[derive(Debug, Default)]
pub struct RecordingSink {
    delivered: std::sync::Mutex<Vec<AlertPayload>>,
    fail: bool,
}

#[cfg(any(test, feature = "mock-bluetooth"))]
impl RecordingSink {
    /// A sink whose every delivery fails.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            delivered: std::sync::Mutex::default(),
            fail: true,
        }
    }

    /// Payloads seen so far, including failed attempts.
    #[must_use]
    pub fn payloads(&self) -> Vec<AlertPayload> {
        self.delivered
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }
}

#[cfg(any(test, feature = "mock-bluetooth"))]
#[async_trait::async_trait]
impl AlertSink for RecordingSink {
    fn name(&self) -> &str {
        "recording"
    }

    async fn deliver(&self, payload: &AlertPayload) -> DispatchResult<DeliveryReceipt> {
        if let Ok(mut delivered) = self.delivered.lock() {
            delivered.push(payload.clone());
        }
        if self.fail {
            return Err(DispatchError::InvalidUrl {
                url: "recording://".to_string(),
                message: "configured to fail".to_string(),
            });
        }
        Ok(DeliveryReceipt { status: 200 })
    }
}

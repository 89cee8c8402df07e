//! Bluetooth Low Energy link to the health band.
//!
//! This module provides:
//! - [`Transport`]: discover the band by name and subscribe to its telemetry
//!   characteristic
//! - [`Subscription`]: the typed [`LinkEvent`] stream plus a [`LinkControl`] for
//!   tearing the link down
//! - A BlueZ implementation (feature `bluetooth`) and an in-memory mock
//!   (feature `mock-bluetooth`)

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::config::DeviceConfig;

#[cfg(feature = "bluetooth")]
pub mod bluez;
#[cfg(any(test, feature = "mock-bluetooth"))]
pub mod mock;

#[cfg(feature = "bluetooth")]
pub use bluez::BluezTransport;
#[cfg(any(test, feature = "mock-bluetooth"))]
pub use mock::{MockDevice, MockTransport};

/// Capacity of the per-link event channel.
pub const LINK_EVENT_BUFFER: usize = 64;

/// Errors raised while establishing or holding the link.
#[derive(Debug, Clone, Error)]
pub enum LinkError {
    /// No Bluetooth adapter is available.
    #[error("Bluetooth adapter not found")]
    AdapterNotFound,

    /// The adapter is present but could not be powered on.
    #[error("Bluetooth adapter is powered off")]
    AdapterPoweredOff,

    /// Discovery finished without seeing the band.
    #[error("Device '{name}' not found. Make sure the band is on and in range.")]
    DeviceNotFound {
        /// Advertised name that was searched for.
        name: String,
    },

    /// Discovery ran out of time.
    #[error("Discovery timed out after {duration_secs} seconds. The band may be out of range.")]
    DiscoveryTimeout {
        /// Configured discovery timeout.
        duration_secs: u64,
    },

    /// The band connected but never finished resolving its GATT services.
    #[error("Band services did not resolve within {duration_secs} seconds. Try reconnecting.")]
    ServicesUnresolved {
        /// Configured discovery timeout.
        duration_secs: u64,
    },

    /// The band does not expose the telemetry service.
    #[error("Service {uuid} not found on device")]
    ServiceNotFound {
        /// Service that was looked up.
        uuid: Uuid,
    },

    /// The service lacks the telemetry characteristic.
    #[error("Characteristic {uuid} not found in service")]
    CharacteristicNotFound {
        /// Characteristic that was looked up.
        uuid: Uuid,
    },

    /// Notifications could not be enabled.
    #[error("Failed to start notifications: {message}")]
    NotifyFailed {
        /// Stack error message.
        message: String,
    },

    /// Any other Bluetooth stack error.
    #[error("Bluetooth error: {message}")]
    Bluetooth {
        /// Stack error message.
        message: String,
    },

    /// Internal failure, such as a panicked connection task.
    #[error("Internal link error: {message}")]
    Internal {
        /// What went wrong.
        message: String,
    },
}

impl LinkError {
    /// First sentence of the message, for the status line.
    #[must_use]
    pub fn summary(&self) -> String {
        let message = self.to_string();
        message
            .split('.')
            .next()
            .unwrap_or_default()
            .trim()
            .to_string()
    }
}

/// Result alias for link operations.
pub type LinkResult<T> = std::result::Result<T, LinkError>;

/// What to connect to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceTarget {
    /// Advertised device name.
    pub name: String,
    /// Telemetry service.
    pub service_uuid: Uuid,
    /// Telemetry notify characteristic.
    pub characteristic_uuid: Uuid,
    /// Upper bound on discovery.
    pub discovery_timeout: Duration,
}

impl From<&DeviceConfig> for DeviceTarget {
    fn from(config: &DeviceConfig) -> Self {
        Self {
            name: config.name.clone(),
            service_uuid: config.service_uuid,
            characteristic_uuid: config.characteristic_uuid,
            discovery_timeout: Duration::from_secs(config.discovery_timeout_secs),
        }
    }
}

/// Event delivered by an active link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// One notification from the telemetry characteristic.
    DataReceived(Vec<u8>),
    /// The link dropped without being asked to.
    LinkLost,
}

/// Tears down an active link.
#[async_trait::async_trait]
pub trait LinkControl: Send {
    /// Disconnect from the band.
    async fn disconnect(&mut self) -> LinkResult<()>;
}

/// An established link: its events and the means to close it.
pub struct Subscription {
    events: mpsc::Receiver<LinkEvent>,
    control: Box<dyn LinkControl>,
}

impl Subscription {
    /// Bundle an event receiver with its control.
    #[must_use]
    pub fn new(events: mpsc::Receiver<LinkEvent>, control: Box<dyn LinkControl>) -> Self {
        Self { events, control }
    }

    /// Split into the event receiver and the control.
    #[must_use]
    pub fn into_parts(self) -> (mpsc::Receiver<LinkEvent>, Box<dyn LinkControl>) {
        (self.events, self.control)
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}

/// Await `setup` on a freshly connected band, running `release` if it fails.
///
/// Keeps a failed subscription from leaving the band connected at the
/// adapter level.
#[cfg_attr(not(feature = "bluetooth"), allow(dead_code))]
pub(crate) async fn release_on_error<T>(
    setup: impl Future<Output = LinkResult<T>>,
    release: impl Future<Output = ()>,
) -> LinkResult<T> {
    match setup.await {
        Ok(value) => Ok(value),
        Err(e) => {
            tracing::debug!(error = %e, "Link setup failed, releasing band");
            release.await;
            Err(e)
        }
    }
}

/// Wireless transport able to reach a single named band.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Find the band, connect, and subscribe to its telemetry characteristic.
    async fn discover_and_connect(&self, target: &DeviceTarget) -> LinkResult<Subscription>;
}

//! # fallguard-core
//!
//! Core logic for the fallguard health band bridge.
//!
//! This crate provides:
//! - A BLE link to the band and decoding of its JSON telemetry frames
//! - The session state machine that owns the connection and display state
//! - A cancellable fall countdown that escalates to an alert webhook
//! - Persistent storage for the caregiver contact attached to every alert
//!
//! ## Architecture
//!
//! The crate is organized into the following modules:
//!
//! - [`transport`] - Discovery, connection and notification stream (BlueZ or mock)
//! - [`frame`] - Telemetry frame decoding
//! - [`session`] - Connection lifecycle, frame handling and escalation on one task
//! - [`escalation`] - Single-flight fall countdown
//! - [`dispatch`] - Alert payload construction and webhook delivery
//! - [`contacts`] - Caregiver contact persistence
//! - [`display`] - Display projection published by the session
//! - [`config`] - Application configuration loading, saving, and validation
//! - [`error`] - Errors returned across the crate boundary
//! - [`types`] - Shared types and OpenAPI schemas

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![warn(missing_docs)]

pub mod config;
pub mod contacts;
pub mod dispatch;
pub mod display;
pub mod error;
pub mod escalation;
pub mod frame;
pub mod session;
pub mod transport;
pub mod types;

// Re-export primary types for convenience
pub use config::{
    default_config_path, AlertConfig, Config, ConfigError, ConfigResult, DeviceConfig,
    LoggingConfig, ServerConfig, StorageConfig,
};
pub use contacts::{
    default_contact_path, default_data_dir, CaregiverContact, ContactStore, ContactStoreError,
    JsonContactStore, MemoryContactStore, NOT_PROVIDED,
};
#[cfg(any(test, feature = "mock-bluetooth"))]
pub use dispatch::RecordingSink;
pub use dispatch::{
    AlertDispatcher, AlertPayload, AlertSink, DispatchError, DispatchOutcome, WebhookSink,
};
pub use display::{DisplayState, PLACEHOLDER};
pub use error::{Error, FallguardError, Result};
pub use escalation::{EscalationTimer, Tick, DEFAULT_COUNTDOWN_SECS};
pub use frame::{decode, DecodeError, TelemetryRecord};
pub use session::{Session, SessionHandle};
#[cfg(feature = "bluetooth")]
pub use transport::BluezTransport;
#[cfg(any(test, feature = "mock-bluetooth"))]
pub use transport::{MockDevice, MockTransport};
pub use transport::{DeviceTarget, LinkError, LinkEvent, Subscription, Transport};
pub use types::ConnectionState;

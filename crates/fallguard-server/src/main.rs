//! # fallguard-server
//!
//! HTTP server for the fallguard health band bridge.
//!
//! This binary:
//! - Runs the band session (BLE link, telemetry decoding, fall countdown)
//! - Posts fall alerts with the caregiver contact to the configured webhook
//! - Serves the REST API and its OpenAPI document
//! - Writes structured logs to stdout, and to rolling files in production
//!
//! ## Running
//!
//! ```bash
//! # Development, against the in-memory band
//! cargo run --package fallguard-server --no-default-features --features mock-bluetooth
//!
//! # Production
//! ./fallguard-server /etc/fallguard/config.toml
//! ```
//!
//! The configuration path may also be given in `FALLGUARD_CONFIG`.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use fallguard_core::{
    default_config_path, AlertDispatcher, Config, ContactStore, DeviceTarget, JsonContactStore,
    Session, Transport, WebhookSink,
};
use fallguard_server::api::create_router;
use fallguard_server::logging;
use fallguard_server::state::AppState;
use tokio::net::TcpListener;
use tracing::{info, warn};

const CONFIG_PATH_ENV: &str = "FALLGUARD_CONFIG";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = config_path();
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;

    logging::init(&config.logging)?;
    info!(config = %config_path.display(), "Starting fallguard-server");

    config.validate().context("invalid configuration")?;

    let contacts: Arc<dyn ContactStore> = Arc::new(JsonContactStore::new(&config.storage.data_dir));
    let sink = WebhookSink::new(
        &config.alert.webhook_url,
        Duration::from_secs(config.alert.request_timeout_secs),
    )?;
    info!(webhook = %sink.url(), "Fall alerts will be posted to webhook");
    let dispatcher = AlertDispatcher::new(Arc::new(sink), Arc::clone(&contacts));

    let session = Session::new(
        DeviceTarget::from(&config.device),
        transport(&config).await?,
        dispatcher,
        config.alert.countdown_secs,
    );
    let (handle, session_task) = session.run();

    let addr = config.server.bind_address;
    let app = create_router(AppState::new(handle.clone(), contacts).shared());

    let listener = TcpListener::bind(addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("HTTP server stopped, shutting down session");
    if let Err(e) = handle.shutdown().await {
        warn!(error = %e, "Session already stopped");
    }
    session_task.await?;

    Ok(())
}

fn config_path() -> PathBuf {
    std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .or_else(|| std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from))
        .unwrap_or_else(default_config_path)
}

#[cfg(feature = "bluetooth")]
async fn transport(_config: &Config) -> anyhow::Result<Arc<dyn Transport>> {
    let transport = fallguard_core::BluezTransport::new()
        .await
        .context("failed to open BlueZ session")?;
    Ok(Arc::new(transport))
}

#[cfg(all(not(feature = "bluetooth"), feature = "mock-bluetooth"))]
async fn transport(config: &Config) -> anyhow::Result<Arc<dyn Transport>> {
    use fallguard_core::{MockDevice, MockTransport};

    warn!("Built without BlueZ support, using the in-memory band");
    Ok(Arc::new(MockTransport::new(MockDevice::new(
        config.device.name.clone(),
    ))))
}

#[cfg(not(any(feature = "bluetooth", feature = "mock-bluetooth")))]
async fn transport(_config: &Config) -> anyhow::Result<Arc<dyn Transport>> {
    anyhow::bail!("built without a Bluetooth transport; enable `bluetooth` or `mock-bluetooth`")
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C"),
        () = terminate => info!("Received SIGTERM"),
    }
}

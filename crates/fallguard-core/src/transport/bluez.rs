//! BlueZ transport built on `bluer`.

use std::time::Duration;

use bluer::gatt::remote::Characteristic;
use bluer::{Adapter, AdapterEvent, Device, DeviceEvent, DeviceProperty, ErrorKind};
use futures::StreamExt;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{
    release_on_error, DeviceTarget, LinkControl, LinkError, LinkEvent, LinkResult, Subscription,
    Transport, LINK_EVENT_BUFFER,
};

const SERVICE_POLL: Duration = Duration::from_millis(200);

impl From<bluer::Error> for LinkError {
    fn from(err: bluer::Error) -> Self {
        Self::Bluetooth {
            message: err.to_string(),
        }
    }
}

/// Transport using the system BlueZ daemon.
pub struct BluezTransport {
    session: bluer::Session,
}

impl BluezTransport {
    /// Open a session with `bluetoothd`.
    ///
    /// # Errors
    ///
    /// Returns an error if the D-Bus session cannot be established.
    pub async fn new() -> LinkResult<Self> {
        let session = bluer::Session::new().await?;
        Ok(Self { session })
    }

    async fn adapter(&self) -> LinkResult<Adapter> {
        let adapter = self.session.default_adapter().await.map_err(|e| match e.kind {
            ErrorKind::NotFound => LinkError::AdapterNotFound,
            _ => LinkError::from(e),
        })?;

        if !adapter.is_powered().await? {
            info!(adapter = adapter.name(), "Powering on Bluetooth adapter");
            adapter
                .set_powered(true)
                .await
                .map_err(|_| LinkError::AdapterPoweredOff)?;
        }
        Ok(adapter)
    }
}

#[async_trait::async_trait]
impl Transport for BluezTransport {
    async fn discover_and_connect(&self, target: &DeviceTarget) -> LinkResult<Subscription> {
        let adapter = self.adapter().await?;

        info!(device = %target.name, "Scanning for band");
        let device = tokio::time::timeout(target.discovery_timeout, find_device(&adapter, &target.name))
            .await
            .map_err(|_| LinkError::DiscoveryTimeout {
                duration_secs: target.discovery_timeout.as_secs(),
            })??;

        if !device.is_connected().await? {
            info!(address = %device.address(), "Connecting to band");
            device.connect().await?;
        }

        release_on_error(subscribe(&device, target), release(&device)).await
    }
}

/// Resolve the telemetry characteristic and start forwarding its notifications.
async fn subscribe(device: &Device, target: &DeviceTarget) -> LinkResult<Subscription> {
    let characteristic = resolve_characteristic(device, target).await?;

    let (events_tx, events_rx) = mpsc::channel(LINK_EVENT_BUFFER);
    let (ready_tx, ready_rx) = oneshot::channel();
    let forwarder = tokio::spawn(forward_events(
        device.clone(),
        characteristic,
        events_tx,
        ready_tx,
    ));

    ready_rx.await.map_err(|_| LinkError::Internal {
        message: "notification task exited before subscribing".to_string(),
    })??;

    info!(address = %device.address(), "Subscribed to band telemetry");
    Ok(Subscription::new(
        events_rx,
        Box::new(BluezLink {
            device: device.clone(),
            forwarder,
        }),
    ))
}

/// Find a device advertising `name`, checking known devices before scanning.
async fn find_device(adapter: &Adapter, name: &str) -> LinkResult<Device> {
    for address in adapter.device_addresses().await? {
        let device = adapter.device(address)?;
        if device.name().await?.as_deref() == Some(name) {
            debug!(%address, "Band already known to adapter");
            return Ok(device);
        }
    }

    let discovery = adapter.discover_devices().await?;
    futures::pin_mut!(discovery);

    while let Some(event) = discovery.next().await {
        if let AdapterEvent::DeviceAdded(address) = event {
            let device = adapter.device(address)?;
            match device.name().await {
                Ok(Some(found)) if found == name => {
                    debug!(%address, "Band discovered");
                    return Ok(device);
                }
                Ok(_) => {}
                Err(e) => debug!(%address, error = %e, "Skipping device without readable name"),
            }
        }
    }

    Err(LinkError::DeviceNotFound {
        name: name.to_string(),
    })
}

/// Drop a half-established connection.
async fn release(device: &Device) {
    if let Err(e) = device.disconnect().await {
        warn!(address = %device.address(), error = %e, "Failed to release band after setup error");
    }
}

/// Wait for GATT services to resolve, then look up the telemetry characteristic.
async fn resolve_characteristic(
    device: &Device,
    target: &DeviceTarget,
) -> LinkResult<Characteristic> {
    let resolved = async {
        while !device.is_services_resolved().await? {
            tokio::time::sleep(SERVICE_POLL).await;
        }
        Ok::<(), LinkError>(())
    };
    tokio::time::timeout(target.discovery_timeout, resolved)
        .await
        .map_err(|_| LinkError::ServicesUnresolved {
            duration_secs: target.discovery_timeout.as_secs(),
        })??;

    find_characteristic(device, target).await
}

async fn find_characteristic(device: &Device, target: &DeviceTarget) -> LinkResult<Characteristic> {
    for service in device.services().await? {
        if service.uuid().await? != target.service_uuid {
            continue;
        }
        for characteristic in service.characteristics().await? {
            if characteristic.uuid().await? == target.characteristic_uuid {
                return Ok(characteristic);
            }
        }
        return Err(LinkError::CharacteristicNotFound {
            uuid: target.characteristic_uuid,
        });
    }

    Err(LinkError::ServiceNotFound {
        uuid: target.service_uuid,
    })
}

/// Forward notifications and disconnect events until the link ends.
async fn forward_events(
    device: Device,
    characteristic: Characteristic,
    events: mpsc::Sender<LinkEvent>,
    ready: oneshot::Sender<LinkResult<()>>,
) {
    let notifications = match characteristic.notify().await {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready.send(Err(LinkError::NotifyFailed {
                message: e.to_string(),
            }));
            return;
        }
    };
    let device_events = match device.events().await {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready.send(Err(e.into()));
            return;
        }
    };
    futures::pin_mut!(notifications);
    futures::pin_mut!(device_events);

    if ready.send(Ok(())).is_err() {
        return;
    }

    loop {
        tokio::select! {
            value = notifications.next() => match value {
                Some(bytes) => {
                    if events.send(LinkEvent::DataReceived(bytes)).await.is_err() {
                        return;
                    }
                }
                None => {
                    warn!("Telemetry notifications ended");
                    break;
                }
            },
            event = device_events.next() => match event {
                Some(DeviceEvent::PropertyChanged(DeviceProperty::Connected(false))) => {
                    warn!(address = %device.address(), "Band disconnected");
                    break;
                }
                Some(_) => {}
                None => {
                    warn!("Device event stream ended");
                    break;
                }
            },
        }
    }

    let _ = events.send(LinkEvent::LinkLost).await;
}

struct BluezLink {
    device: Device,
    forwarder: JoinHandle<()>,
}

#[async_trait::async_trait]
impl LinkControl for BluezLink {
    async fn disconnect(&mut self) -> LinkResult<()> {
        self.forwarder.abort();
        self.device.disconnect().await?;
        info!(address = %self.device.address(), "Disconnected from band");
        Ok(())
    }
}

//! In-memory transport for tests and hardware-less runs.
//!
//! The mock advertises at most one [`MockDevice`]. Tests push frames and link
//! drops through the [`MockTransport`] handle after the session has connected.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::mpsc;

use super::{
    DeviceTarget, LinkControl, LinkError, LinkEvent, LinkResult, Subscription, Transport,
    LINK_EVENT_BUFFER,
};

/// A simulated band.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockDevice {
    /// Advertised name.
    pub name: String,
}

impl MockDevice {
    /// A band advertising `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[derive(Debug, Default)]
struct MockState {
    device: Option<MockDevice>,
    scripted_failures: VecDeque<LinkError>,
    connect_delay: Duration,
    disconnect_delay: Duration,
    active: Option<mpsc::Sender<LinkEvent>>,
    connect_attempts: u32,
    disconnects: u32,
}

/// Transport that never touches a radio.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    /// Transport with `device` in range.
    #[must_use]
    pub fn new(device: MockDevice) -> Self {
        let transport = Self::default();
        transport.lock().device = Some(device);
        transport
    }

    /// Transport with nothing in range.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Make the next connection attempt fail with `error`.
    pub fn fail_next_connect(&self, error: LinkError) {
        self.lock().scripted_failures.push_back(error);
    }

    /// Delay every connection attempt by `delay`.
    pub fn set_connect_delay(&self, delay: Duration) {
        self.lock().connect_delay = delay;
    }

    /// Delay every explicit disconnect by `delay`.
    pub fn set_disconnect_delay(&self, delay: Duration) {
        self.lock().disconnect_delay = delay;
    }

    /// Deliver a notification on the active link.
    ///
    /// Returns `false` if no link is active.
    pub async fn push_frame(&self, bytes: impl Into<Vec<u8>>) -> bool {
        self.send(LinkEvent::DataReceived(bytes.into())).await
    }

    /// Simulate the band dropping the link.
    ///
    /// Returns `false` if no link is active.
    pub async fn drop_link(&self) -> bool {
        let sent = self.send(LinkEvent::LinkLost).await;
        self.lock().active = None;
        sent
    }

    async fn send(&self, event: LinkEvent) -> bool {
        let sender = self.lock().active.clone();
        match sender {
            Some(sender) => sender.send(event).await.is_ok(),
            None => false,
        }
    }

    /// Whether a link is currently established.
    #[must_use]
    pub fn is_linked(&self) -> bool {
        self.lock().active.as_ref().is_some_and(|s| !s.is_closed())
    }

    /// Number of connection attempts so far.
    #[must_use]
    pub fn connect_attempts(&self) -> u32 {
        self.lock().connect_attempts
    }

    /// Number of explicit disconnects so far.
    #[must_use]
    pub fn disconnects(&self) -> u32 {
        self.lock().disconnects
    }
}

#[async_trait::async_trait]
impl Transport for MockTransport {
    async fn discover_and_connect(&self, target: &DeviceTarget) -> LinkResult<Subscription> {
        let delay = {
            let mut state = self.lock();
            state.connect_attempts += 1;
            state.connect_delay
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.lock();
        if let Some(error) = state.scripted_failures.pop_front() {
            return Err(error);
        }
        match &state.device {
            Some(device) if device.name == target.name => {}
            _ => {
                return Err(LinkError::DeviceNotFound {
                    name: target.name.clone(),
                })
            }
        }

        let (tx, rx) = mpsc::channel(LINK_EVENT_BUFFER);
        state.active = Some(tx.clone());
        Ok(Subscription::new(
            rx,
            Box::new(MockLink {
                state: Arc::clone(&self.state),
                channel: tx,
            }),
        ))
    }
}

struct MockLink {
    state: Arc<Mutex<MockState>>,
    channel: mpsc::Sender<LinkEvent>,
}

impl MockLink {
    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait::async_trait]
impl LinkControl for MockLink {
    async fn disconnect(&mut self) -> LinkResult<()> {
        let delay = self.lock().disconnect_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.lock();
        state.disconnects += 1;
        // A newer link may already be active; leave it alone.
        if state
            .active
            .as_ref()
            .is_some_and(|active| active.same_channel(&self.channel))
        {
            state.active = None;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeviceConfig;

    fn target() -> DeviceTarget {
        DeviceTarget::from(&DeviceConfig::default())
    }

    #[tokio::test]
    async fn test_connects_to_matching_device() {
        let transport = MockTransport::new(MockDevice::new("HealthBand"));
        let subscription = transport.discover_and_connect(&target()).await.unwrap();
        let (mut events, _control) = subscription.into_parts();

        assert!(transport.is_linked());
        assert!(transport.push_frame(b"{}".to_vec()).await);
        assert_eq!(
            events.recv().await,
            Some(LinkEvent::DataReceived(b"{}".to_vec()))
        );
    }

    #[tokio::test]
    async fn test_missing_device_is_not_found() {
        let transport = MockTransport::empty();
        let err = tokio_test::assert_err!(transport.discover_and_connect(&target()).await);
        assert!(matches!(err, LinkError::DeviceNotFound { .. }));
        assert_eq!(transport.connect_attempts(), 1);
    }

    #[tokio::test]
    async fn test_scripted_failure_applies_once() {
        let transport = MockTransport::new(MockDevice::new("HealthBand"));
        transport.fail_next_connect(LinkError::AdapterPoweredOff);

        assert!(transport.discover_and_connect(&target()).await.is_err());
        assert!(transport.discover_and_connect(&target()).await.is_ok());
    }

    #[tokio::test]
    async fn test_disconnect_closes_link() {
        let transport = MockTransport::new(MockDevice::new("HealthBand"));
        let (_events, mut control) = transport
            .discover_and_connect(&target())
            .await
            .unwrap()
            .into_parts();

        tokio_test::assert_ok!(control.disconnect().await);
        assert!(!transport.is_linked());
        assert_eq!(transport.disconnects(), 1);
        assert!(!transport.push_frame(b"{}".to_vec()).await);
    }

    #[tokio::test]
    async fn test_stale_disconnect_keeps_newer_link() {
        let transport = MockTransport::new(MockDevice::new("HealthBand"));
        let (_old_events, mut old_control) = transport
            .discover_and_connect(&target())
            .await
            .unwrap()
            .into_parts();
        let (mut events, _control) = transport
            .discover_and_connect(&target())
            .await
            .unwrap()
            .into_parts();

        tokio_test::assert_ok!(old_control.disconnect().await);
        assert_eq!(transport.disconnects(), 1);
        assert!(transport.is_linked());
        assert!(transport.push_frame(b"{}".to_vec()).await);
        assert_eq!(
            events.recv().await,
            Some(LinkEvent::DataReceived(b"{}".to_vec()))
        );
    }

    #[tokio::test]
    async fn test_drop_link_emits_link_lost() {
        let transport = MockTransport::new(MockDevice::new("HealthBand"));
        let (mut events, _control) = transport
            .discover_and_connect(&target())
            .await
            .unwrap()
            .into_parts();

        assert!(transport.drop_link().await);
        assert_eq!(events.recv().await, Some(LinkEvent::LinkLost));
    }
}

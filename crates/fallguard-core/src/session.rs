//! Telemetry session state machine.
//!
//! A [`Session`] runs on a single task and owns the connection state, the latest
//! record, the display projection and the escalation timer. Everything else talks
//! to it through a [`SessionHandle`]:
//!
//! - commands (toggle, cancel, shutdown) arrive over an mpsc channel
//! - link events arrive over the subscription's channel
//! - the display projection is published through a `watch` channel
//!
//! Because arm, tick and cancel all run on that one task, a cancel handled before
//! the expiring tick always wins, and an expiry always dispatches exactly once.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::dispatch::{AlertDispatcher, DispatchOutcome};
use crate::display::DisplayState;
use crate::error::{FallguardError, Result};
use crate::escalation::{EscalationTimer, Tick};
use crate::frame::{self, TelemetryRecord};
use crate::transport::{
    DeviceTarget, LinkControl, LinkError, LinkEvent, LinkResult, Subscription, Transport,
};
use crate::types::ConnectionState;

const COMMAND_BUFFER: usize = 16;
const TICK_PERIOD: Duration = Duration::from_secs(1);

/// Request sent to the session task.
#[derive(Debug)]
pub enum SessionCommand {
    /// Connect when disconnected, disconnect when connected.
    Toggle {
        /// Receives the display published by the toggle.
        reply: oneshot::Sender<DisplayState>,
    },
    /// Cancel a running fall countdown.
    CancelAlert {
        /// Receives whether a countdown was running.
        reply: oneshot::Sender<bool>,
    },
    /// Stop the session after draining in-flight alerts.
    Shutdown,
}

/// Cloneable handle to a running session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
    display: watch::Receiver<DisplayState>,
}

impl SessionHandle {
    /// Ask the session to connect or disconnect.
    ///
    /// Returns the display exactly as the toggle left it, so the connection state
    /// and the status line always agree.
    ///
    /// # Errors
    ///
    /// Returns [`FallguardError::SessionClosed`] if the session has stopped.
    pub async fn request_toggle(&self) -> Result<DisplayState> {
        let (reply, response) = oneshot::channel();
        self.send(SessionCommand::Toggle { reply }).await?;
        response.await.map_err(|_| FallguardError::SessionClosed)
    }

    /// Cancel the running fall countdown, if any.
    ///
    /// Returns whether a countdown was cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`FallguardError::SessionClosed`] if the session has stopped.
    pub async fn cancel_alert(&self) -> Result<bool> {
        let (reply, response) = oneshot::channel();
        self.send(SessionCommand::CancelAlert { reply }).await?;
        response.await.map_err(|_| FallguardError::SessionClosed)
    }

    /// Ask the session to stop.
    ///
    /// # Errors
    ///
    /// Returns [`FallguardError::SessionClosed`] if the session has already stopped.
    pub async fn shutdown(&self) -> Result<()> {
        self.send(SessionCommand::Shutdown).await
    }

    /// The latest published display state.
    #[must_use]
    pub fn display(&self) -> DisplayState {
        self.display.borrow().clone()
    }

    /// A receiver that observes every display update.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<DisplayState> {
        self.display.clone()
    }

    async fn send(&self, command: SessionCommand) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| FallguardError::SessionClosed)
    }
}

/// The session task's state.
pub struct Session {
    target: DeviceTarget,
    transport: Arc<dyn Transport>,
    dispatcher: AlertDispatcher,

    state: ConnectionState,
    latest: Option<TelemetryRecord>,
    display: DisplayState,
    published: watch::Sender<DisplayState>,
    timer: EscalationTimer,

    pending: Option<JoinHandle<LinkResult<Subscription>>>,
    closing: Option<JoinHandle<()>>,
    events: Option<mpsc::Receiver<LinkEvent>>,
    link: Option<Box<dyn LinkControl>>,
    ticker: Option<Interval>,
    dispatches: JoinSet<DispatchOutcome>,
}

impl Session {
    /// Create a disconnected session that counts down `countdown_secs` before
    /// escalating a fall.
    pub fn new(
        target: DeviceTarget,
        transport: Arc<dyn Transport>,
        dispatcher: AlertDispatcher,
        countdown_secs: u32,
    ) -> Self {
        let display = DisplayState::default();
        let (published, _) = watch::channel(display.clone());

        Self {
            target,
            transport,
            dispatcher,
            state: ConnectionState::Disconnected,
            latest: None,
            display,
            published,
            timer: EscalationTimer::new(countdown_secs),
            pending: None,
            closing: None,
            events: None,
            link: None,
            ticker: None,
            dispatches: JoinSet::new(),
        }
    }

    /// Spawn the session task.
    ///
    /// The task ends after [`SessionHandle::shutdown`] or once every handle is
    /// dropped.
    #[must_use]
    pub fn run(self) -> (SessionHandle, JoinHandle<()>) {
        let (commands, receiver) = mpsc::channel(COMMAND_BUFFER);
        let handle = SessionHandle {
            commands,
            display: self.published.subscribe(),
        };
        let task = tokio::spawn(self.event_loop(receiver));
        (handle, task)
    }

    async fn event_loop(mut self, mut commands: mpsc::Receiver<SessionCommand>) {
        info!(device = %self.target.name, countdown = self.timer.countdown(), "Session started");

        loop {
            tokio::select! {
                biased;

                command = commands.recv() => match command {
                    Some(SessionCommand::Toggle { reply }) => {
                        let display = self.request_toggle();
                        let _ = reply.send(display);
                    }
                    Some(SessionCommand::CancelAlert { reply }) => {
                        let cancelled = self.cancel_alert();
                        let _ = reply.send(cancelled);
                    }
                    Some(SessionCommand::Shutdown) | None => break,
                },

                result = wait_connect(&mut self.pending) => self.on_connect_result(result),

                // Countdown ticks go ahead of queued frames.
                () = next_tick(&mut self.ticker) => self.on_tick(),

                event = next_link_event(&mut self.events) => self.handle_link_event(event),

                Some(joined) = self.dispatches.join_next(), if !self.dispatches.is_empty() => {
                    if let Err(e) = joined {
                        error!(error = %e, "Alert dispatch task failed");
                    }
                }
            }
        }

        self.teardown().await;
    }

    fn request_toggle(&mut self) -> DisplayState {
        match self.state {
            ConnectionState::Disconnected => self.begin_connect(),
            ConnectionState::Connecting => {
                debug!("Connection attempt already in progress, ignoring toggle");
            }
            ConnectionState::Connected => self.disconnect(),
        }
        self.display.clone()
    }

    fn begin_connect(&mut self) {
        info!(device = %self.target.name, "Connecting to band");

        let transport = Arc::clone(&self.transport);
        let target = self.target.clone();
        let closing = self.closing.take();
        self.pending = Some(tokio::spawn(async move {
            // The previous link must be fully down before the band is reached again.
            if let Some(closing) = closing {
                if let Err(e) = closing.await {
                    warn!(error = %e, "Previous disconnect task failed");
                }
            }
            transport.discover_and_connect(&target).await
        }));

        self.set_connection(ConnectionState::Connecting, "Connecting...");
        self.publish();
    }

    fn on_connect_result(&mut self, result: LinkResult<Subscription>) {
        match result {
            Ok(subscription) => {
                let (events, link) = subscription.into_parts();
                self.events = Some(events);
                self.link = Some(link);
                info!(device = %self.target.name, "Connected to band");
                self.set_connection(ConnectionState::Connected, "Connected");
            }
            Err(e) => {
                warn!(device = %self.target.name, error = %e, "Failed to connect to band");
                self.set_connection(
                    ConnectionState::Disconnected,
                    &format!("Error: {}", e.summary()),
                );
            }
        }
        self.publish();
    }

    fn disconnect(&mut self) {
        info!(device = %self.target.name, "Disconnecting from band");
        self.events = None;
        if let Some(mut link) = self.link.take() {
            self.closing = Some(tokio::spawn(async move {
                if let Err(e) = link.disconnect().await {
                    warn!(error = %e, "Disconnect did not complete cleanly");
                }
            }));
        }
        self.mark_disconnected();
    }

    fn on_link_lost(&mut self) {
        warn!(device = %self.target.name, armed = self.timer.is_armed(), "Link to band lost");
        self.events = None;
        self.link = None;
        self.mark_disconnected();
    }

    fn mark_disconnected(&mut self) {
        self.latest = None;
        self.display.reset_metrics();
        self.set_connection(ConnectionState::Disconnected, "Disconnected");
        self.publish();
    }

    fn handle_link_event(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::DataReceived(bytes) => {
                if self.state != ConnectionState::Connected {
                    debug!(state = %self.state, "Dropping frame received while not connected");
                    return;
                }
                match frame::decode(&bytes) {
                    Ok(record) => self.accept_record(record),
                    Err(e) => warn!(error = %e, len = bytes.len(), "Dropping malformed frame"),
                }
            }
            LinkEvent::LinkLost => self.on_link_lost(),
        }
    }

    fn accept_record(&mut self, record: TelemetryRecord) {
        debug!(
            bpm = ?record.heart_rate,
            steps = ?record.step_count,
            fall = record.fall_detected,
            "Telemetry received"
        );
        self.display.show_record(&record);
        if record.fall_detected {
            self.arm_escalation(record.clone());
        }
        self.latest = Some(record);
        self.publish();
    }

    fn arm_escalation(&mut self, record: TelemetryRecord) {
        if !self.timer.arm(record) {
            debug!("Fall reported while a countdown is already running");
            return;
        }

        warn!(
            countdown = self.timer.countdown(),
            "Fall detected, alert will be sent unless cancelled"
        );
        let mut ticker = interval_at(Instant::now() + TICK_PERIOD, TICK_PERIOD);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.ticker = Some(ticker);
        self.display.countdown = self.timer.remaining();
    }

    fn on_tick(&mut self) {
        match self.timer.tick() {
            Tick::Idle => {
                self.ticker = None;
                self.display.countdown = None;
            }
            Tick::Counting { remaining } => {
                debug!(remaining, "Fall countdown");
                self.display.countdown = Some(remaining);
            }
            Tick::Expired(record) => {
                self.ticker = None;
                self.display.countdown = None;
                self.escalate(record);
            }
        }
        self.publish();
    }

    fn escalate(&mut self, record: TelemetryRecord) {
        info!("Fall countdown expired, dispatching alert");
        let dispatcher = self.dispatcher.clone();
        self.dispatches
            .spawn(async move { dispatcher.dispatch(record).await });
    }

    fn cancel_alert(&mut self) -> bool {
        let cancelled = self.timer.cancel();
        if cancelled {
            info!("Fall alert cancelled");
            self.ticker = None;
            self.display.countdown = None;
            self.publish();
        } else {
            debug!("Cancel requested with no countdown running");
        }
        cancelled
    }

    async fn teardown(mut self) {
        if let Some(pending) = self.pending.take() {
            pending.abort();
        }
        self.events = None;
        if let Some(closing) = self.closing.take() {
            if let Err(e) = closing.await {
                warn!(error = %e, "Previous disconnect task failed");
            }
        }
        if let Some(mut link) = self.link.take() {
            if let Err(e) = link.disconnect().await {
                warn!(error = %e, "Disconnect during shutdown failed");
            }
        }
        if self.timer.cancel() {
            info!("Discarding fall countdown on shutdown");
        }

        if !self.dispatches.is_empty() {
            info!(
                in_flight = self.dispatches.len(),
                "Waiting for alert deliveries to finish"
            );
        }
        while let Some(joined) = self.dispatches.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Alert dispatch task failed");
            }
        }
        info!("Session stopped");
    }

    fn set_connection(&mut self, state: ConnectionState, message: &str) {
        self.state = state;
        self.display.set_connection(state, message);
    }

    fn publish(&self) {
        self.published.send_replace(self.display.clone());
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("target", &self.target)
            .field("state", &self.state)
            .field("latest", &self.latest)
            .field("timer", &self.timer)
            .finish_non_exhaustive()
    }
}

async fn wait_connect(
    pending: &mut Option<JoinHandle<LinkResult<Subscription>>>,
) -> LinkResult<Subscription> {
    let Some(handle) = pending.as_mut() else {
        return std::future::pending().await;
    };
    let result = handle.await.unwrap_or_else(|e| {
        Err(LinkError::Internal {
            message: e.to_string(),
        })
    });
    *pending = None;
    result
}

async fn next_link_event(events: &mut Option<mpsc::Receiver<LinkEvent>>) -> LinkEvent {
    match events.as_mut() {
        Some(receiver) => receiver.recv().await.unwrap_or(LinkEvent::LinkLost),
        None => std::future::pending().await,
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker.as_mut() {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeviceConfig;
    use crate::contacts::{CaregiverContact, ContactStore, MemoryContactStore, NOT_PROVIDED};
    use crate::dispatch::RecordingSink;
    use crate::display::PLACEHOLDER;
    use crate::transport::{MockDevice, MockTransport};

    const WAIT: Duration = Duration::from_secs(120);

    struct Harness {
        handle: SessionHandle,
        task: JoinHandle<()>,
        transport: MockTransport,
        sink: Arc<RecordingSink>,
        contacts: Arc<MemoryContactStore>,
    }

    impl Harness {
        fn start() -> Self {
            let transport = MockTransport::new(MockDevice::new("HealthBand"));
            let sink = Arc::new(RecordingSink::default());
            let contacts = Arc::new(MemoryContactStore::default());
            let dispatcher = AlertDispatcher::new(sink.clone(), contacts.clone());
            let session = Session::new(
                DeviceTarget::from(&DeviceConfig::default()),
                Arc::new(transport.clone()),
                dispatcher,
                7,
            );
            let (handle, task) = session.run();

            Self {
                handle,
                task,
                transport,
                sink,
                contacts,
            }
        }

        async fn connected() -> Self {
            let harness = Self::start();
            let display = harness.handle.request_toggle().await.unwrap();
            assert_eq!(display.connection, ConnectionState::Connecting);
            harness
                .wait_for(|d| d.connection == ConnectionState::Connected)
                .await;
            harness
        }

        async fn wait_for(&self, predicate: impl FnMut(&DisplayState) -> bool) -> DisplayState {
            let mut receiver = self.handle.subscribe();
            let state = tokio::time::timeout(WAIT, receiver.wait_for(predicate))
                .await
                .expect("display never reached expected state")
                .unwrap()
                .clone();
            state
        }

        async fn push(&self, frame: &str) {
            assert!(self.transport.push_frame(frame.as_bytes().to_vec()).await);
        }

        /// Stop the session, waiting for in-flight alerts.
        async fn finish(self) -> Vec<crate::dispatch::AlertPayload> {
            self.handle.shutdown().await.unwrap();
            self.task.await.unwrap();
            self.sink.payloads()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_initial_display() {
        let harness = Harness::start();
        let display = harness.handle.display();
        assert_eq!(display.connection, ConnectionState::Disconnected);
        assert_eq!(display.status, "Status: Disconnected");
        assert_eq!(display.toggle_label, "Connect to Band");
        harness.finish().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_shows_connected() {
        let harness = Harness::connected().await;
        let display = harness.handle.display();
        assert_eq!(display.status, "Status: Connected");
        assert_eq!(display.toggle_label, "Disconnect");
        assert_eq!(harness.transport.connect_attempts(), 1);
        harness.finish().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_normal_frame_updates_display() {
        let harness = Harness::connected().await;
        harness.push(r#"{"bpm":72,"steps":100,"fall":false}"#).await;

        let display = harness.wait_for(|d| d.heart_rate == "72").await;
        assert_eq!(display.steps, "100");
        assert_eq!(display.latitude, PLACEHOLDER);
        assert!(display.countdown.is_none());

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(harness.finish().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fall_dispatches_once_after_countdown() {
        let harness = Harness::connected().await;
        harness.push(r#"{"bpm":60,"steps":5,"fall":true}"#).await;

        let display = harness.wait_for(|d| d.countdown.is_some()).await;
        assert_eq!(display.countdown, Some(7));
        let armed_at = Instant::now();

        harness.wait_for(|d| d.countdown.is_none()).await;
        let elapsed = armed_at.elapsed();
        assert!(elapsed >= Duration::from_secs(7), "expired after {elapsed:?}");
        assert!(elapsed < Duration::from_secs(8), "expired after {elapsed:?}");

        let payloads = harness.finish().await;
        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0].record.heart_rate, Some(60));
        assert_eq!(payloads[0].record.step_count, Some(5));
        assert!(payloads[0].record.fall_detected);
        assert_eq!(payloads[0].caregiver.name, NOT_PROVIDED);
        assert_eq!(payloads[0].caregiver.mobile, NOT_PROVIDED);
        assert_eq!(payloads[0].caregiver.email, NOT_PROVIDED);
    }

    #[tokio::test(start_paused = true)]
    async fn test_falls_during_countdown_do_not_rearm() {
        let harness = Harness::connected().await;
        harness.push(r#"{"bpm":60,"fall":true}"#).await;
        harness.wait_for(|d| d.countdown == Some(5)).await;

        harness.push(r#"{"bpm":140,"fall":true}"#).await;
        let display = harness.wait_for(|d| d.heart_rate == "140").await;
        assert_eq!(display.countdown, Some(5));

        harness.wait_for(|d| d.countdown.is_none()).await;
        tokio::time::sleep(Duration::from_secs(10)).await;

        let payloads = harness.finish().await;
        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0].record.heart_rate, Some(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_at_third_tick_prevents_dispatch() {
        let harness = Harness::connected().await;
        harness.push(r#"{"bpm":60,"fall":true}"#).await;
        harness.wait_for(|d| d.countdown == Some(4)).await;

        assert!(harness.handle.cancel_alert().await.unwrap());
        assert!(harness.handle.display().countdown.is_none());

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(harness.handle.display().countdown.is_none());
        assert!(!harness.handle.cancel_alert().await.unwrap());
        assert!(harness.finish().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_without_countdown_is_noop() {
        let harness = Harness::connected().await;
        assert!(!harness.handle.cancel_alert().await.unwrap());
        assert!(harness.finish().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_caregiver_read_at_dispatch_time() {
        let harness = Harness::connected().await;
        harness.push(r#"{"bpm":60,"fall":true}"#).await;
        harness.wait_for(|d| d.countdown == Some(3)).await;

        harness
            .contacts
            .put(&CaregiverContact {
                name: "Ana".into(),
                mobile: "555-0100".into(),
                email: String::new(),
            })
            .unwrap();
        harness.wait_for(|d| d.countdown.is_none()).await;

        let payloads = harness.finish().await;
        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0].caregiver.name, "Ana");
        assert_eq!(payloads[0].caregiver.email, NOT_PROVIDED);
    }

    #[tokio::test(start_paused = true)]
    async fn test_link_loss_resets_display() {
        let harness = Harness::connected().await;
        harness
            .push(r#"{"bpm":72,"steps":100,"lat":51.5,"lon":-0.12}"#)
            .await;
        let display = harness.wait_for(|d| d.map_link.is_some()).await;
        assert_eq!(display.latitude, "51.5");

        assert!(harness.transport.drop_link().await);
        let display = harness
            .wait_for(|d| d.connection == ConnectionState::Disconnected)
            .await;
        assert_eq!(display.status, "Status: Disconnected");
        assert_eq!(display.heart_rate, PLACEHOLDER);
        assert_eq!(display.steps, PLACEHOLDER);
        assert_eq!(display.latitude, PLACEHOLDER);
        assert_eq!(display.longitude, PLACEHOLDER);
        assert!(display.map_link.is_none());
        harness.finish().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_countdown_survives_link_loss() {
        let harness = Harness::connected().await;
        harness.push(r#"{"bpm":60,"fall":true}"#).await;
        harness.wait_for(|d| d.countdown == Some(6)).await;

        assert!(harness.transport.drop_link().await);
        let display = harness
            .wait_for(|d| d.connection == ConnectionState::Disconnected)
            .await;
        assert!(display.countdown.is_some());

        harness.wait_for(|d| d.countdown.is_none()).await;
        assert_eq!(harness.finish().await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_failure_shows_error() {
        let harness = Harness::start();
        harness.transport.fail_next_connect(LinkError::DeviceNotFound {
            name: "HealthBand".into(),
        });

        harness.handle.request_toggle().await.unwrap();
        let display = harness
            .wait_for(|d| d.status.starts_with("Status: Error"))
            .await;
        assert_eq!(display.status, "Status: Error: Device 'HealthBand' not found");
        assert_eq!(display.connection, ConnectionState::Disconnected);
        assert_eq!(display.toggle_label, "Connect to Band");

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(harness.transport.connect_attempts(), 1);
        harness.finish().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_toggle_while_connecting_is_ignored() {
        let harness = Harness::start();
        harness.transport.set_connect_delay(Duration::from_secs(5));

        let first = harness.handle.request_toggle().await.unwrap();
        assert_eq!(first.connection, ConnectionState::Connecting);
        let second = harness.handle.request_toggle().await.unwrap();
        assert_eq!(second.connection, ConnectionState::Connecting);
        assert_eq!(second.status, "Status: Connecting...");

        harness
            .wait_for(|d| d.connection == ConnectionState::Connected)
            .await;
        assert_eq!(harness.transport.connect_attempts(), 1);
        harness.finish().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_toggle_while_connected_disconnects() {
        let harness = Harness::connected().await;
        harness.push(r#"{"bpm":72,"lat":1.5,"lon":2.5}"#).await;
        harness.wait_for(|d| d.heart_rate == "72").await;

        let display = harness.handle.request_toggle().await.unwrap();
        assert_eq!(display.connection, ConnectionState::Disconnected);
        assert_eq!(display.status, "Status: Disconnected");
        assert_eq!(display.heart_rate, PLACEHOLDER);
        assert!(display.map_link.is_none());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(harness.transport.disconnects(), 1);
        assert!(!harness.transport.is_linked());
        harness.finish().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_waits_for_previous_disconnect() {
        let harness = Harness::connected().await;
        harness.transport.set_disconnect_delay(Duration::from_secs(2));

        let display = harness.handle.request_toggle().await.unwrap();
        assert_eq!(display.connection, ConnectionState::Disconnected);
        let display = harness.handle.request_toggle().await.unwrap();
        assert_eq!(display.connection, ConnectionState::Connecting);

        harness
            .wait_for(|d| d.connection == ConnectionState::Connected)
            .await;
        assert_eq!(harness.transport.disconnects(), 1);
        assert_eq!(harness.transport.connect_attempts(), 2);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(harness.transport.is_linked());
        assert_eq!(harness.handle.display().connection, ConnectionState::Connected);

        harness.push(r#"{"bpm":91}"#).await;
        harness.wait_for(|d| d.heart_rate == "91").await;
        harness.finish().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_not_starved_by_frames() {
        let harness = Harness::connected().await;
        harness.push(r#"{"bpm":60,"fall":true}"#).await;
        harness.wait_for(|d| d.countdown == Some(7)).await;

        for bpm in 0..40 {
            harness.push(&format!(r#"{{"bpm":{bpm}}}"#)).await;
        }
        harness.wait_for(|d| d.countdown.is_none()).await;
        assert_eq!(harness.finish().await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_frames_are_dropped() {
        let harness = Harness::connected().await;
        assert!(harness.transport.push_frame(vec![0xff, 0xfe, 0x00]).await);
        harness.push("{not json").await;
        harness.push("[1,2,3]").await;
        harness.push(r#"{"bpm":80}"#).await;

        let display = harness.wait_for(|d| d.heart_rate == "80").await;
        assert_eq!(display.connection, ConnectionState::Connected);
        harness.finish().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_handle_fails_after_shutdown() {
        let harness = Harness::start();
        let handle = harness.handle.clone();
        harness.finish().await;

        assert!(matches!(
            handle.request_toggle().await,
            Err(FallguardError::SessionClosed)
        ));
        assert!(matches!(
            handle.cancel_alert().await,
            Err(FallguardError::SessionClosed)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_disconnects_link() {
        let harness = Harness::connected().await;
        let transport = harness.transport.clone();
        harness.finish().await;
        assert_eq!(transport.disconnects(), 1);
    }
}

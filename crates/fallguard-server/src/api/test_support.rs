//! Router fixtures backed by the mock transport.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use fallguard_core::{
    AlertDispatcher, Config, ConnectionState, DeviceTarget, DisplayState, MemoryContactStore,
    MockDevice, MockTransport, RecordingSink, Session,
};

use crate::state::{AppState, SharedState};

const WAIT: Duration = Duration::from_secs(5);

pub struct TestApp {
    pub state: SharedState,
    pub transport: MockTransport,
    pub sink: Arc<RecordingSink>,
    pub contacts: Arc<MemoryContactStore>,
}

impl TestApp {
    pub fn new() -> Self {
        let config = Config::default();
        let transport = MockTransport::new(MockDevice::new(config.device.name.clone()));
        let sink = Arc::new(RecordingSink::default());
        let contacts = Arc::new(MemoryContactStore::default());

        let dispatcher = AlertDispatcher::new(sink.clone(), contacts.clone());
        let session = Session::new(
            DeviceTarget::from(&config.device),
            Arc::new(transport.clone()),
            dispatcher,
            config.alert.countdown_secs,
        );
        let (handle, _task) = session.run();

        Self {
            state: AppState::new(handle, contacts.clone()).shared(),
            transport,
            sink,
            contacts,
        }
    }

    pub async fn connected() -> Self {
        let app = Self::new();
        app.state.session.request_toggle().await.unwrap();
        app.wait_for(|d| d.connection == ConnectionState::Connected)
            .await;
        app
    }

    pub fn router(&self) -> Router {
        super::create_router(Arc::clone(&self.state))
    }

    pub async fn push(&self, frame: &str) {
        assert!(self.transport.push_frame(frame.as_bytes().to_vec()).await);
    }

    pub async fn wait_for(&self, predicate: impl FnMut(&DisplayState) -> bool) {
        let mut receiver = self.state.session.subscribe();
        tokio::time::timeout(WAIT, receiver.wait_for(predicate))
            .await
            .expect("display never reached expected state")
            .unwrap();
    }

    /// Shut the session down and wait for its task to finish.
    pub async fn stop(&self) {
        let mut receiver = self.state.session.subscribe();
        self.state.session.shutdown().await.unwrap();
        while receiver.changed().await.is_ok() {}
    }
}

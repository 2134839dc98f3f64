//! One operator session: a stream client and the controller bound to it.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch};

use crate::config::StreamConfig;
use crate::controller::Controller;
use crate::state::{InvalidTransitionError, State, StateSnapshot};
use crate::stream::{ConnectionState, Connector, StreamClient, WsConnector};

pub struct Session {
    client: Arc<StreamClient>,
    controller: Controller,
}

impl Session {
    /// Builds a session over `connector`. Nothing connects until
    /// [`Session::start`].
    pub fn new(connector: Arc<dyn Connector>, cfg: &StreamConfig) -> Self {
        let client = Arc::new(StreamClient::with_connect_timeout(
            connector,
            cfg.reconnect.policy(),
            cfg.connect_timeout(),
        ));
        let controller = Controller::bind(client.clone());
        Self { client, controller }
    }

    pub fn from_config(cfg: &StreamConfig) -> Self {
        Self::new(Arc::new(WsConnector::new(cfg.url.clone())), cfg)
    }

    pub fn start(&self) {
        self.client.connect();
    }

    pub fn controller(&self) -> &Controller {
        &self.controller
    }

    pub fn client(&self) -> &StreamClient {
        &self.client
    }

    pub fn current(&self) -> State {
        self.controller.current()
    }

    pub fn request_transition(&self, to: State) -> Result<(), InvalidTransitionError> {
        self.controller.request_transition(to)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StateSnapshot> {
        self.controller.subscribe()
    }

    pub fn subscribe_connection(&self) -> watch::Receiver<ConnectionState> {
        self.client.subscribe_connection()
    }

    /// Waits until the connection is open, or `timeout` elapses.
    pub async fn wait_open(&self, timeout: Duration) -> bool {
        let mut rx = self.client.subscribe_connection();
        let opened = matches!(
            tokio::time::timeout(timeout, rx.wait_for(|s| *s == ConnectionState::Open)).await,
            Ok(Ok(_))
        );
        opened
    }

    pub async fn close(&self) {
        self.client.close();
        self.client.join().await;
    }
}

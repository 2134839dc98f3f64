#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use statelink_core::error::TransportError;
use statelink_core::stream::{Connector, Transport};
use tokio::sync::mpsc;

/// In-memory connector. Every successful `connect` hands the test a
/// [`RemoteEnd`] standing in for the backend side of that connection.
pub struct MemoryConnector {
    accepted_tx: mpsc::UnboundedSender<RemoteEnd>,
    refuse: AtomicBool,
    attempts: Mutex<Vec<Instant>>,
}

impl MemoryConnector {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<RemoteEnd>) {
        let (accepted_tx, accepted_rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            accepted_tx,
            refuse: AtomicBool::new(false),
            attempts: Mutex::new(Vec::new()),
        });
        (connector, accepted_rx)
    }

    pub fn set_refuse(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    pub fn attempts(&self) -> usize {
        self.attempts.lock().unwrap().len()
    }

    /// When each `connect` call started, oldest first.
    pub fn attempt_times(&self) -> Vec<Instant> {
        self.attempts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self) -> Result<Box<dyn Transport>, TransportError> {
        self.attempts.lock().unwrap().push(Instant::now());
        if self.refuse.load(Ordering::SeqCst) {
            return Err(TransportError::Connect {
                endpoint: self.endpoint().to_string(),
                reason: "refused".into(),
            });
        }
        let (to_client_tx, to_client_rx) = mpsc::unbounded_channel();
        let (to_remote_tx, to_remote_rx) = mpsc::unbounded_channel();
        let _ = self.accepted_tx.send(RemoteEnd {
            tx: Some(to_client_tx),
            rx: to_remote_rx,
        });
        Ok(Box::new(MemoryTransport {
            rx: to_client_rx,
            tx: to_remote_tx,
        }))
    }

    fn endpoint(&self) -> &str {
        "mem://backend"
    }
}

/// Connector whose handshake never completes, like a peer that accepts the
/// TCP connection and then goes silent.
#[derive(Default)]
pub struct HangingConnector {
    attempts: AtomicUsize,
}

impl HangingConnector {
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for HangingConnector {
    async fn connect(&self) -> Result<Box<dyn Transport>, TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        std::future::pending().await
    }

    fn endpoint(&self) -> &str {
        "mem://silent"
    }
}

struct MemoryTransport {
    rx: mpsc::UnboundedReceiver<String>,
    tx: mpsc::UnboundedSender<String>,
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&mut self, frame: String) -> Result<(), TransportError> {
        self.tx
            .send(frame)
            .map_err(|_| TransportError::Send("remote end dropped".into()))
    }

    async fn recv(&mut self) -> Option<Result<String, TransportError>> {
        self.rx.recv().await.map(Ok)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.rx.close();
        Ok(())
    }
}

/// Backend side of one in-memory connection.
pub struct RemoteEnd {
    tx: Option<mpsc::UnboundedSender<String>>,
    rx: mpsc::UnboundedReceiver<String>,
}

impl RemoteEnd {
    pub fn push(&self, frame: &str) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(frame.to_string());
        }
    }

    pub fn push_state(&self, state: &str) {
        self.push(&format!(r#"{{"type":"state_update","state":"{state}"}}"#));
    }

    /// Next frame written by the client, if one arrives within `wait`.
    pub async fn next_frame(&mut self, wait: Duration) -> Option<String> {
        tokio::time::timeout(wait, self.rx.recv()).await.ok().flatten()
    }

    /// Simulates the backend dropping the connection.
    pub fn hang_up(&mut self) {
        self.tx = None;
    }
}

/// Routes `tracing` output through the test harness. Set `RUST_LOG` to see it.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub async fn next_accepted(
    accepted: &mut mpsc::UnboundedReceiver<RemoteEnd>,
    wait: Duration,
) -> RemoteEnd {
    tokio::time::timeout(wait, accepted.recv())
        .await
        .expect("timed out waiting for a connection")
        .expect("connector dropped")
}

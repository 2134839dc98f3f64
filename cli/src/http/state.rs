//! Shared state of the reference backend.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use statelink_core::api::{State, StateMachine, StateSnapshot};
use thiserror::Error;
use tokio::sync::broadcast;

/// Number of error entries retained by the backend.
pub const ERROR_LOG_CAPACITY: usize = 15;

const UPDATE_CHANNEL_CAPACITY: usize = 64;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("Invalid state: {0}")]
    UnknownState(String),
    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition { from: State, to: State },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub timestamp: String,
    pub message: String,
}

/// Bounded, oldest-first error log.
#[derive(Debug, Default)]
pub struct ErrorLog {
    entries: VecDeque<ErrorEntry>,
}

impl ErrorLog {
    pub fn push(&mut self, message: String) {
        if self.entries.len() == ERROR_LOG_CAPACITY {
            self.entries.pop_front();
        }
        self.entries.push_back(ErrorEntry {
            timestamp: Local::now().to_rfc3339(),
            message,
        });
    }

    pub fn entries(&self) -> Vec<ErrorEntry> {
        self.entries.iter().cloned().collect()
    }
}

/// Shared across every handler and observer connection.
#[derive(Clone)]
pub struct AppState {
    current: Arc<RwLock<StateSnapshot>>,
    errors: Arc<RwLock<ErrorLog>>,
    updates_tx: broadcast::Sender<State>,
    calibrate_after: Option<Duration>,
    pub stats: Arc<RwLock<ServerStats>>,
    pub shutdown_tx: broadcast::Sender<()>,
}

impl AppState {
    pub fn new(calibrate_after: Option<Duration>) -> Self {
        let (updates_tx, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            current: Arc::new(RwLock::new(StateSnapshot::default())),
            errors: Arc::new(RwLock::new(ErrorLog::default())),
            updates_tx,
            calibrate_after,
            stats: Arc::new(RwLock::new(ServerStats::new())),
            shutdown_tx,
        }
    }

    pub fn current(&self) -> State {
        read(&self.current).state
    }

    /// Current state plus a receiver for every later commit. Taken under the
    /// state lock, so nothing committed in between is missed or repeated.
    pub fn subscribe(&self) -> (State, broadcast::Receiver<State>) {
        let guard = read(&self.current);
        (guard.state, self.updates_tx.subscribe())
    }

    pub fn observer_count(&self) -> usize {
        self.updates_tx.receiver_count()
    }

    /// Validates a raw state name and commits it as an ordered step.
    pub fn request_raw(&self, raw: &str) -> Result<State, BackendError> {
        match raw.parse::<State>() {
            Ok(next) => self.request(next),
            Err(_) => Err(self.record(BackendError::UnknownState(raw.to_string()))),
        }
    }

    /// Commits `next` if it is a step down or exactly one step up, then
    /// broadcasts it to every observer. Rejections go to the error log.
    pub fn request(&self, next: State) -> Result<State, BackendError> {
        let mut guard = write(&self.current);
        let from = guard.state;
        if !StateMachine::is_ordered_step(from, next) {
            drop(guard);
            return Err(self.record(BackendError::InvalidTransition { from, to: next }));
        }

        *guard = StateSnapshot::new(next);
        let entered_at = guard.changed_at;
        let _ = self.updates_tx.send(next);
        drop(guard);
        tracing::info!(from = %from, to = %next, "state committed");

        if next == State::Calibrate {
            self.schedule_calibration(entered_at);
        }
        Ok(next)
    }

    pub fn errors(&self) -> Vec<ErrorEntry> {
        read(&self.errors).entries()
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    fn record(&self, err: BackendError) -> BackendError {
        tracing::warn!("{err}");
        write(&self.errors).push(err.to_string());
        err
    }

    /// Promotes CALIBRATE to READY once the calibration window elapses,
    /// unless the state moved on in the meantime.
    fn schedule_calibration(&self, entered_at: DateTime<chrono::Utc>) {
        let Some(after) = self.calibrate_after else {
            return;
        };
        let state = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            let mut guard = write(&state.current);
            if guard.state != State::Calibrate || guard.changed_at != entered_at {
                return;
            }
            *guard = StateSnapshot::new(State::Ready);
            let _ = state.updates_tx.send(State::Ready);
            drop(guard);
            tracing::info!("calibration complete, promoted to READY");
        });
    }
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Request counters reported by `/health`.
pub struct ServerStats {
    pub requests_total: u64,
    pub requests_by_endpoint: HashMap<String, u64>,
    pub start_time: DateTime<Local>,
}

impl ServerStats {
    pub fn new() -> Self {
        Self {
            requests_total: 0,
            requests_by_endpoint: HashMap::new(),
            start_time: Local::now(),
        }
    }

    pub fn increment_request(&mut self, endpoint: &str) {
        self.requests_total += 1;
        *self
            .requests_by_endpoint
            .entry(endpoint.to_string())
            .or_insert(0) += 1;
    }

    pub fn uptime_seconds(&self) -> f64 {
        let now = Local::now();
        (now - self.start_time).num_milliseconds() as f64 / 1000.0
    }
}

impl Default for ServerStats {
    fn default() -> Self {
        Self::new()
    }
}

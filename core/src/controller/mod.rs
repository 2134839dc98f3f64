//! Session controller
//!
//! The only writer of a session's current state. Operator requests are gated
//! by [`StateMachine`] and forwarded; the local state changes only when the
//! backend broadcasts the new state back.

use std::sync::{Arc, RwLock, Weak};

use tokio::sync::broadcast;
use tracing::debug;

use crate::state::{InvalidTransitionError, State, StateMachine, StateSnapshot};
use crate::stream::{StreamClient, TransitionSink};

const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Clone)]
pub struct Controller {
    inner: Arc<ControllerInner>,
}

struct ControllerInner {
    current: RwLock<StateSnapshot>,
    last_error: RwLock<Option<InvalidTransitionError>>,
    outbound: Arc<dyn TransitionSink>,
    event_tx: broadcast::Sender<StateSnapshot>,
}

impl Controller {
    /// Controller starting at `OFF`, forwarding requests to `outbound`.
    pub fn new(outbound: Arc<dyn TransitionSink>) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(ControllerInner {
                current: RwLock::new(StateSnapshot::default()),
                last_error: RwLock::new(None),
                outbound,
                event_tx,
            }),
        }
    }

    /// Controller wired to `client`: requests go out through it and its
    /// inbound broadcasts are applied here.
    pub fn bind(client: Arc<StreamClient>) -> Self {
        let controller = Self::new(client.clone());
        let weak: Weak<ControllerInner> = Arc::downgrade(&controller.inner);
        client.on_inbound_update(move |state| {
            if let Some(inner) = weak.upgrade() {
                Controller { inner }.apply_remote(state);
            }
        });
        controller
    }

    pub fn current(&self) -> State {
        self.snapshot().state
    }

    pub fn snapshot(&self) -> StateSnapshot {
        self.inner
            .current
            .read()
            .map(|snapshot| *snapshot)
            .unwrap_or_else(|poisoned| *poisoned.into_inner())
    }

    /// Most recent rejected request, cleared by the next accepted request or
    /// authoritative update.
    pub fn last_error(&self) -> Option<InvalidTransitionError> {
        self.inner
            .last_error
            .read()
            .map(|e| *e)
            .unwrap_or_else(|poisoned| *poisoned.into_inner())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StateSnapshot> {
        self.inner.event_tx.subscribe()
    }

    /// Targets the operator may currently request.
    pub fn available_transitions(&self) -> Vec<State> {
        StateMachine::available_transitions(self.current())
    }

    /// Validates `to` against the current state and, if legal, forwards it.
    ///
    /// Local state is left untouched; it follows the backend's echo. A
    /// rejected request never reaches the network.
    pub fn request_transition(&self, to: State) -> Result<(), InvalidTransitionError> {
        let current = self.current();
        match StateMachine::apply(current, to) {
            Ok(next) => {
                self.set_last_error(None);
                debug!(target: "statelink.controller", from = %current, to = %next, "forwarding transition request");
                self.inner.outbound.send(next);
                Ok(())
            }
            Err(e) => {
                debug!(target: "statelink.controller", error = %e, "transition rejected locally");
                self.set_last_error(Some(e));
                Err(e)
            }
        }
    }

    /// Commits an authoritative state and notifies observers. No validation.
    pub fn apply_remote(&self, state: State) {
        let snapshot = StateSnapshot::new(state);
        let previous = match self.inner.current.write() {
            Ok(mut current) => std::mem::replace(&mut *current, snapshot),
            Err(poisoned) => std::mem::replace(&mut *poisoned.into_inner(), snapshot),
        };
        self.set_last_error(None);
        debug!(
            target: "statelink.controller",
            from = %previous.state,
            to = %state,
            "authoritative state applied"
        );
        let _ = self.inner.event_tx.send(snapshot);
    }

    fn set_last_error(&self, err: Option<InvalidTransitionError>) {
        match self.inner.last_error.write() {
            Ok(mut slot) => *slot = err,
            Err(poisoned) => *poisoned.into_inner() = err,
        }
    }
}

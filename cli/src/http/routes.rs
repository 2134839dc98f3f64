//! HTTP route handlers and the `/ws` observer endpoint.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State as Extract,
    },
    response::Response,
    routing::get,
    Json, Router,
};
use chrono::Local;
use futures::{SinkExt, StreamExt};
use statelink_core::api::{
    decode_client, encode, ClientMessage, ProtocolError, ServerMessage, State,
};
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

use crate::http::{models::*, state::AppState};

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/api/state", get(get_state_handler).post(set_state_handler))
        .route("/api/errors", get(errors_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

fn count(state: &AppState, endpoint: &str) {
    let mut stats = state
        .stats
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    stats.increment_request(endpoint);
}

/// GET /api/state
async fn get_state_handler(Extract(state): Extract<AppState>) -> Json<StateResponse> {
    count(&state, "/api/state");
    Json(StateResponse {
        state: state.current(),
    })
}

/// POST /api/state
async fn set_state_handler(
    Extract(state): Extract<AppState>,
    Json(req): Json<SetStateRequest>,
) -> Result<Json<StateResponse>, HttpServerError> {
    count(&state, "/api/state");
    let committed = state.request_raw(&req.state)?;
    Ok(Json(StateResponse { state: committed }))
}

/// GET /api/errors
async fn errors_handler(Extract(state): Extract<AppState>) -> Json<ErrorsResponse> {
    count(&state, "/api/errors");
    Json(ErrorsResponse {
        errors: state.errors(),
    })
}

/// GET /health
async fn health_handler(Extract(state): Extract<AppState>) -> Json<HealthResponse> {
    count(&state, "/health");
    let stats = state
        .stats
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner());

    Json(HealthResponse {
        status: "healthy".into(),
        state: state.current(),
        observers: state.observer_count(),
        uptime_seconds: stats.uptime_seconds(),
        requests_handled: stats.requests_total,
        requests_by_endpoint: stats.requests_by_endpoint.clone(),
        timestamp: Local::now().to_rfc3339(),
    })
}

/// GET /ws
async fn ws_handler(ws: WebSocketUpgrade, Extract(state): Extract<AppState>) -> Response {
    count(&state, "/ws");
    ws.on_upgrade(move |socket| observer_session(socket, state))
}

fn update_frame(state: State) -> Option<String> {
    match encode(&ServerMessage::StateUpdate { state }) {
        Ok(frame) => Some(frame),
        Err(e) => {
            tracing::error!("encode state_update failed: {e}");
            None
        }
    }
}

/// One observer connection: re-sync on accept, then fan out every commit
/// while handling the observer's own `state_change` requests.
async fn observer_session(socket: WebSocket, state: AppState) {
    let id = Uuid::new_v4();
    let (mut sink, mut stream) = socket.split();
    let (current, mut updates) = state.subscribe();
    let mut shutdown = state.shutdown_tx.subscribe();
    tracing::info!(observer = %id, "observer connected");

    if let Some(frame) = update_frame(current) {
        if sink.send(Message::Text(frame)).await.is_err() {
            return;
        }
    }

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                let _ = sink.send(Message::Close(None)).await;
                break;
            }
            update = updates.recv() => {
                let next = match update {
                    Ok(next) => next,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(observer = %id, skipped, "observer lagged, re-syncing");
                        state.current()
                    }
                    Err(RecvError::Closed) => break,
                };
                let Some(frame) = update_frame(next) else { continue };
                if sink.send(Message::Text(frame)).await.is_err() {
                    break;
                }
            }
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => handle_frame(&state, &text),
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(observer = %id, "receive failed: {e}");
                    break;
                }
            },
        }
    }

    tracing::info!(observer = %id, "observer disconnected");
}

fn handle_frame(state: &AppState, text: &str) {
    match decode_client(text) {
        Ok(ClientMessage::StateChange { state: next }) => {
            let _ = state.request(next);
        }
        Err(ProtocolError::UnknownState(unknown)) => {
            let _ = state.request_raw(&unknown.0);
        }
        Err(e) => tracing::warn!("dropping frame: {e}"),
    }
}

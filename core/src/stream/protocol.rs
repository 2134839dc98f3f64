//! Wire protocol: one JSON object per text frame.
//!
//! ```text
//! server -> client  {"type":"state_update","state":"READY"}
//! client -> server  {"type":"state_change","state":"READY"}
//! ```
//!
//! Decoding is exhaustive and fails closed: an unknown `type`, a missing
//! `state`, or a state name outside the five known values is an error, never a
//! guessed fallback.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtocolError;
use crate::state::{State, UnknownState};

pub const STATE_UPDATE: &str = "state_update";
pub const STATE_CHANGE: &str = "state_change";

/// Messages broadcast by the authoritative backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    StateUpdate { state: State },
}

/// Messages sent by a control surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    StateChange { state: State },
}

pub fn encode<T: Serialize>(msg: &T) -> Result<String, ProtocolError> {
    serde_json::to_string(msg).map_err(ProtocolError::Encode)
}

pub fn decode_server(text: &str) -> Result<ServerMessage, ProtocolError> {
    serde_json::from_str(text).map_err(|err| classify(text, STATE_UPDATE, err))
}

pub fn decode_client(text: &str) -> Result<ClientMessage, ProtocolError> {
    serde_json::from_str(text).map_err(|err| classify(text, STATE_CHANGE, err))
}

/// Narrows a decode failure so callers can report *why* a frame was dropped.
fn classify(text: &str, expected: &str, err: serde_json::Error) -> ProtocolError {
    let Ok(value) = serde_json::from_str::<Value>(text) else {
        return ProtocolError::Malformed(err);
    };
    match value.get("type").and_then(Value::as_str) {
        Some(kind) if kind == expected => match value.get("state").and_then(Value::as_str) {
            Some(raw) => ProtocolError::UnknownState(UnknownState(raw.to_string())),
            None => ProtocolError::Malformed(err),
        },
        Some(kind) => ProtocolError::UnexpectedType(kind.to_string()),
        None => ProtocolError::Malformed(err),
    }
}

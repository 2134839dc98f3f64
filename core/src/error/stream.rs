use thiserror::Error;

use crate::state::UnknownState;

/// Failures of the underlying connection. All of them end the current
/// connection and hand control to the reconnect loop.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("connect to {endpoint} failed: {reason}")]
    Connect { endpoint: String, reason: String },
    #[error("send failed: {0}")]
    Send(String),
    #[error("receive failed: {0}")]
    Receive(String),
    #[error("close failed: {0}")]
    Close(String),
}

/// A frame that does not decode to a known message. Dropped by the receiver.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    Malformed(#[source] serde_json::Error),
    #[error("unexpected message type: {0}")]
    UnexpectedType(String),
    #[error(transparent)]
    UnknownState(#[from] UnknownState),
    #[error("encode failed: {0}")]
    Encode(#[source] serde_json::Error),
}

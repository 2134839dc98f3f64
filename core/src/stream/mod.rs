//! Persistent event-stream connection to the authoritative backend.

pub mod backoff;
pub mod client;
pub mod protocol;
pub mod transport;

pub use backoff::{ReconnectPolicy, DEFAULT_RECONNECT_DELAY};
pub use client::{
    ConnectionState, InboundHandler, StreamClient, TransitionSink, DEFAULT_CONNECT_TIMEOUT,
};
pub use protocol::{ClientMessage, ServerMessage};
pub use transport::{Connector, Transport, WsConnector};

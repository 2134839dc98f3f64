//! Stable re-exports for consumers (`cli` and external crates).
//!
//! Prefer importing from `statelink_core::api` instead of reaching into internal modules.

pub use crate::config::{
    load_default, ApiConfig, AppConfig, HttpServerConfig, LoggingConfig, ReconnectConfig,
    ReconnectKind, StreamConfig,
};
pub use crate::controller::Controller;
pub use crate::error::{CliError, ProtocolError, TransportError};
pub use crate::session::Session;
pub use crate::state::{InvalidTransitionError, State, StateMachine, StateSnapshot, UnknownState};
pub use crate::stream::protocol::{decode_client, decode_server, encode};
pub use crate::stream::{
    ClientMessage, ConnectionState, Connector, ReconnectPolicy, ServerMessage, StreamClient,
    Transport, TransitionSink, WsConnector, DEFAULT_CONNECT_TIMEOUT,
};

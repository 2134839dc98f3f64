//! statelink core: the operating-state machine, the resilient event-stream
//! client, and the controller binding the two.

pub mod api;
pub mod config;
pub mod controller;
pub mod error;
pub mod session;
pub mod state;
pub mod stream;

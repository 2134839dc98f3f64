//! statelink-cli library: command handlers and the reference backend, exposed
//! for integration tests.

pub mod commands;
pub mod http;

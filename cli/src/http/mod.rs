//! Reference backend (axum) and the REST client that talks to it.

pub mod client;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod server;
pub mod state;

pub use models::*;
pub use server::*;
pub use state::*;

#[allow(clippy::module_inception)]
pub mod error;
pub mod stream;

pub use error::CliError;
pub use stream::{ProtocolError, TransportError};

//! Duplex byte-stream transports for the delugemux RPC client.
//!
//! Turns an [`Endpoint`] into a connected [`DuplexStream`] and nothing more.
//! Transport security is left to the caller, who may wrap the stream before
//! handing it to the client.

pub mod endpoint;
pub mod error;
pub mod stream;

pub use endpoint::{Endpoint, DEFAULT_HOST, DEFAULT_PORT};
pub use error::{Result, TransportError};
pub use stream::{connect, ConnectConfig, DuplexStream};

use delugemux_frame::{FrameError, Tag, Value};

/// Errors that can occur in RPC operations.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// Transport-level error while establishing the connection.
    #[error("transport error: {0}")]
    Transport(#[from] delugemux_transport::TransportError),

    /// The inbound stream could not be decoded. Fatal to the connection.
    #[error("protocol error: {0}")]
    Protocol(#[from] FrameError),

    /// A result or fault arrived for a tag that is not outstanding.
    #[error("response for unknown request tag {0}")]
    UnknownTag(Tag),

    /// The daemon answered the call with an error payload.
    #[error("remote fault: {0}")]
    Remote(Value),

    /// The caller gave up on the call and released its tag.
    #[error("request {0} abandoned")]
    Abandoned(Tag),

    /// The connection is gone; carries the reason it went away.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),
}

impl RpcError {
    /// Whether this error ended the whole connection rather than one call.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, RpcError::Remote(_) | RpcError::Abandoned(_))
    }

    /// The remote error payload, if this is a remote fault.
    pub fn remote_value(&self) -> Option<&Value> {
        match self {
            RpcError::Remote(value) => Some(value),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, RpcError>;

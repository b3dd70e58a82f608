use std::time::Duration;

/// Errors that can occur while establishing a transport stream.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to connect to the endpoint.
    #[error("failed to connect to {endpoint}: {source}")]
    Connect {
        endpoint: String,
        source: std::io::Error,
    },

    /// The connection attempt did not complete in time.
    #[error("connecting to {endpoint} timed out after {timeout:?}")]
    Timeout { endpoint: String, timeout: Duration },

    /// The endpoint string could not be parsed.
    #[error("invalid endpoint {input:?}: {reason}")]
    InvalidEndpoint { input: String, reason: &'static str },

    /// The socket path is too long for the platform.
    #[error("socket path too long ({len} bytes, max {max}): {path}")]
    PathTooLong {
        path: String,
        len: usize,
        max: usize,
    },

    /// The endpoint kind is not available on this platform.
    #[error("{0} endpoints are not supported on this platform")]
    Unsupported(&'static str),

    /// An I/O error occurred on the transport stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tracing::debug;

use crate::endpoint::Endpoint;
use crate::error::{Result, TransportError};

/// Connection establishment settings.
#[derive(Debug, Clone)]
pub struct ConnectConfig {
    /// Upper bound on the whole connection attempt.
    pub timeout: Duration,
    /// Disable Nagle's algorithm on TCP streams. Frames are small and latency bound.
    pub nodelay: bool,
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            nodelay: true,
        }
    }
}

/// A connected duplex byte stream: implements `AsyncRead + AsyncWrite`.
///
/// This is the stream type handed to the RPC client when the caller does not
/// bring its own.
pub struct DuplexStream {
    inner: DuplexStreamInner,
}

enum DuplexStreamInner {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(tokio::net::UnixStream),
}

impl DuplexStream {
    /// Wrap an already connected TCP stream.
    pub fn from_tcp(stream: TcpStream) -> Self {
        Self {
            inner: DuplexStreamInner::Tcp(stream),
        }
    }

    /// Wrap an already connected Unix stream.
    #[cfg(unix)]
    pub fn from_unix(stream: tokio::net::UnixStream) -> Self {
        Self {
            inner: DuplexStreamInner::Unix(stream),
        }
    }

    /// Human-readable description of the remote side.
    pub fn peer_description(&self) -> String {
        match &self.inner {
            DuplexStreamInner::Tcp(stream) => stream
                .peer_addr()
                .map(|addr| addr.to_string())
                .unwrap_or_else(|_| "tcp:<unknown>".to_string()),
            #[cfg(unix)]
            DuplexStreamInner::Unix(stream) => stream
                .peer_addr()
                .ok()
                .and_then(|addr| addr.as_pathname().map(|p| format!("unix:{}", p.display())))
                .unwrap_or_else(|| "unix:<unnamed>".to_string()),
        }
    }
}

impl AsyncRead for DuplexStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match &mut self.get_mut().inner {
            DuplexStreamInner::Tcp(stream) => Pin::new(stream).poll_read(cx, buf),
            #[cfg(unix)]
            DuplexStreamInner::Unix(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for DuplexStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match &mut self.get_mut().inner {
            DuplexStreamInner::Tcp(stream) => Pin::new(stream).poll_write(cx, buf),
            #[cfg(unix)]
            DuplexStreamInner::Unix(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut self.get_mut().inner {
            DuplexStreamInner::Tcp(stream) => Pin::new(stream).poll_flush(cx),
            #[cfg(unix)]
            DuplexStreamInner::Unix(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut self.get_mut().inner {
            DuplexStreamInner::Tcp(stream) => Pin::new(stream).poll_shutdown(cx),
            #[cfg(unix)]
            DuplexStreamInner::Unix(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}

impl std::fmt::Debug for DuplexStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match &self.inner {
            DuplexStreamInner::Tcp(_) => "tcp",
            #[cfg(unix)]
            DuplexStreamInner::Unix(_) => "unix",
        };
        f.debug_struct("DuplexStream").field("type", &kind).finish()
    }
}

/// Connect to `endpoint`, bounded by `config.timeout`.
pub async fn connect(endpoint: &Endpoint, config: &ConnectConfig) -> Result<DuplexStream> {
    endpoint.validate()?;

    let attempt = connect_inner(endpoint, config);
    let stream = tokio::time::timeout(config.timeout, attempt)
        .await
        .map_err(|_| TransportError::Timeout {
            endpoint: endpoint.to_string(),
            timeout: config.timeout,
        })??;

    debug!(%endpoint, peer = %stream.peer_description(), "transport connected");
    Ok(stream)
}

async fn connect_inner(endpoint: &Endpoint, config: &ConnectConfig) -> Result<DuplexStream> {
    let connect_error = |source| TransportError::Connect {
        endpoint: endpoint.to_string(),
        source,
    };

    match endpoint {
        Endpoint::Tcp { host, port } => {
            let stream = TcpStream::connect((host.as_str(), *port))
                .await
                .map_err(connect_error)?;
            if config.nodelay {
                stream.set_nodelay(true)?;
            }
            Ok(DuplexStream::from_tcp(stream))
        }
        #[cfg(unix)]
        Endpoint::Unix(path) => {
            let stream = tokio::net::UnixStream::connect(path)
                .await
                .map_err(connect_error)?;
            Ok(DuplexStream::from_unix(stream))
        }
        #[cfg(not(unix))]
        Endpoint::Unix(_) => Err(TransportError::Unsupported("unix socket")),
    }
}

//! Connection driver: one read loop and one write loop per stream.

use std::collections::BTreeMap;
use std::io;
use std::sync::Arc;

use delugemux_frame::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::config::ClientConfig;
use crate::error::Result;
use crate::mux::{EventHandler, Multiplexer, OutboundQueue, PendingCall};
use crate::stats::ClientStats;

/// An RPC connection driven by background read and write tasks.
///
/// Must be started inside a Tokio runtime. Dropping the client stops both
/// loops and fails any calls still waiting.
pub struct Client {
    mux: Arc<Multiplexer>,
    shutdown: CancellationToken,
    reader: Option<JoinHandle<()>>,
    writer: Option<JoinHandle<()>>,
}

impl Client {
    /// Start driving `stream`. Events pushed by the daemon are dropped.
    pub fn start<S>(stream: S, config: ClientConfig) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        Self::start_with_event_handler(stream, config, None)
    }

    /// Start driving `stream`, delivering pushed events to `on_event`.
    pub fn start_with_event_handler<S>(
        stream: S,
        config: ClientConfig,
        on_event: Option<EventHandler>,
    ) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (mux, outbound) = Multiplexer::new(config.frame.clone(), on_event);
        let mux = Arc::new(mux);
        let shutdown = CancellationToken::new();
        let (read_half, write_half) = tokio::io::split(stream);

        let reader = tokio::spawn(read_loop(
            read_half,
            Arc::clone(&mux),
            config.read_chunk_size,
            shutdown.clone(),
        ));
        let writer = tokio::spawn(write_loop(
            write_half,
            outbound,
            Arc::clone(&mux),
            shutdown.clone(),
        ));

        Self {
            mux,
            shutdown,
            reader: Some(reader),
            writer: Some(writer),
        }
    }

    /// Issue a call; await the returned handle for the reply.
    pub fn call(
        &self,
        method: impl Into<String>,
        args: Vec<Value>,
        kwargs: BTreeMap<String, Value>,
    ) -> Result<PendingCall> {
        self.mux.call(method, args, kwargs)
    }

    /// Issue a call and wait for its reply.
    pub async fn request(
        &self,
        method: impl Into<String>,
        args: Vec<Value>,
        kwargs: BTreeMap<String, Value>,
    ) -> Result<Value> {
        self.call(method, args, kwargs)?.await
    }

    pub fn multiplexer(&self) -> &Arc<Multiplexer> {
        &self.mux
    }

    pub fn stats(&self) -> ClientStats {
        self.mux.stats()
    }

    pub fn is_closed(&self) -> bool {
        self.mux.is_closed()
    }

    pub fn close_reason(&self) -> Option<String> {
        self.mux.close_reason()
    }

    /// Resolves once either loop has stopped.
    pub async fn closed(&self) {
        self.shutdown.cancelled().await;
    }

    /// Stop both loops, fail pending calls and wait for the tasks to exit.
    pub async fn close(&mut self) {
        self.mux.close("client closed");
        self.shutdown.cancel();
        for handle in [self.reader.take(), self.writer.take()].into_iter().flatten() {
            if let Err(err) = handle.await {
                warn!(error = %err, "connection task ended abnormally");
            }
        }
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.mux.close("client dropped");
        self.shutdown.cancel();
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("mux", &self.mux)
            .field("running", &!self.shutdown.is_cancelled())
            .finish()
    }
}

/// Marks the connection dead when the read loop ends for any reason,
/// including a panicking event handler unwinding the task.
struct ReadLoopExit {
    mux: Arc<Multiplexer>,
    shutdown: CancellationToken,
    reason: String,
}

impl Drop for ReadLoopExit {
    fn drop(&mut self) {
        let failed = self.mux.close(&self.reason);
        debug!(reason = %self.reason, failed, "read loop stopped");
        self.shutdown.cancel();
    }
}

async fn read_loop<R>(
    mut reader: R,
    mux: Arc<Multiplexer>,
    chunk_size: usize,
    shutdown: CancellationToken,
) where
    R: AsyncRead + Unpin,
{
    let mut exit = ReadLoopExit {
        mux: Arc::clone(&mux),
        shutdown: shutdown.clone(),
        reason: "read loop aborted".to_string(),
    };

    let mut chunk = vec![0u8; chunk_size.max(1)];
    exit.reason = loop {
        let read = tokio::select! {
            _ = shutdown.cancelled() => break "client closed".to_string(),
            read = reader.read(&mut chunk) => read,
        };
        match read {
            Ok(0) => break "peer closed the connection".to_string(),
            Ok(n) => {
                if let Err(err) = mux.feed(&chunk[..n]) {
                    error!(error = %err, "inbound stream rejected, closing connection");
                    break err.to_string();
                }
            }
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => {
                warn!(error = %err, "read failed");
                break format!("read failed: {err}");
            }
        }
    };
}

async fn write_loop<W>(
    mut writer: W,
    mut outbound: OutboundQueue,
    mux: Arc<Multiplexer>,
    shutdown: CancellationToken,
) where
    W: AsyncWrite + Unpin,
{
    // Graceful shutdown only once the queue has run dry.
    let drained = loop {
        let frame = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break false,
            frame = outbound.next() => match frame {
                Some(frame) => frame,
                None => break true,
            },
        };

        let written = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break false,
            written = write_frame(&mut writer, &frame) => written,
        };
        if let Err(err) = written {
            warn!(error = %err, "write failed");
            mux.close(&format!("write failed: {err}"));
            break false;
        }
        mux.record_sent(frame.len());
    };

    shutdown.cancel();
    if drained {
        if let Err(err) = writer.shutdown().await {
            debug!(error = %err, "stream shutdown failed");
        }
    }
    debug!(drained, "write loop stopped");
}

async fn write_frame<W>(writer: &mut W, frame: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(frame).await?;
    writer.flush().await
}

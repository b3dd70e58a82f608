//! Pending-call bookkeeping and inbound dispatch.
//!
//! The [`Multiplexer`] is transport-agnostic: [`Multiplexer::call`] queues
//! encoded frames on an [`OutboundQueue`] and [`Multiplexer::feed`] accepts
//! whatever bytes arrived from the peer. The connection driver in
//! [`crate::client`] glues both ends to a socket.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use bytes::{Buf, Bytes, BytesMut};
use delugemux_frame::{
    encode_request, Event, FrameConfig, FrameError, FrameInflater, Request, Response, Tag, Value,
};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace, warn};

use crate::error::{Result, RpcError};
use crate::stats::{ClientStats, Counters};

/// Callback invoked for every event the daemon pushes.
///
/// Runs on the connection's read task. A panic in the handler closes the
/// connection.
pub type EventHandler = Arc<dyn Fn(Event) + Send + Sync>;

type Reply = std::result::Result<Value, RpcError>;

/// Abandoned tags remembered per connection. Beyond this the oldest are
/// forgotten, and a reply that still arrives for one is an unknown tag.
pub const MAX_ABANDONED_TAGS: usize = 1024;

struct PendingTable {
    /// Next tag to hand out. Wraparound after 2^64 calls is unsupported.
    next_tag: Tag,
    slots: HashMap<Tag, oneshot::Sender<Reply>>,
    /// Tags given up by their callers whose replies may still arrive.
    /// Ordered so the oldest can be evicted.
    abandoned: BTreeSet<Tag>,
    /// Dropped on close so the write side sees the end of the queue.
    outbound: Option<mpsc::UnboundedSender<Bytes>>,
    closed: Option<String>,
}

/// Received bytes not yet dispatched, and the inflater working on the frame
/// at their front.
struct Inbound {
    buf: BytesMut,
    inflater: FrameInflater,
}

/// Correlates outgoing calls with incoming replies on one connection.
///
/// Shared between the caller, the read loop and the write loop; every method
/// takes `&self`.
pub struct Multiplexer {
    table: Mutex<PendingTable>,
    inbound: Mutex<Inbound>,
    on_event: Option<EventHandler>,
    frame_config: FrameConfig,
    counters: Counters,
}

/// Receiving end of the outbound frame queue, drained by the write loop.
#[derive(Debug)]
pub struct OutboundQueue {
    rx: mpsc::UnboundedReceiver<Bytes>,
}

impl OutboundQueue {
    /// Next frame in call order. `None` once the multiplexer is closed and
    /// every queued frame has been taken.
    pub async fn next(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }

    /// Take a queued frame without waiting.
    pub fn try_next(&mut self) -> Option<Bytes> {
        self.rx.try_recv().ok()
    }
}

/// Handle for one in-flight call. Resolves exactly once.
///
/// Dropping the handle does not release the tag; use
/// [`Multiplexer::abandon`] for that.
#[derive(Debug)]
pub struct PendingCall {
    tag: Tag,
    rx: oneshot::Receiver<Reply>,
}

impl PendingCall {
    pub fn tag(&self) -> Tag {
        self.tag
    }
}

impl Future for PendingCall {
    type Output = Result<Value>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(reply)) => Poll::Ready(reply),
            Poll::Ready(Err(_)) => Poll::Ready(Err(RpcError::ConnectionClosed(
                "multiplexer dropped".to_string(),
            ))),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Multiplexer {
    /// Create a multiplexer and the queue its frames are sent through.
    pub fn new(frame_config: FrameConfig, on_event: Option<EventHandler>) -> (Self, OutboundQueue) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mux = Self {
            table: Mutex::new(PendingTable {
                next_tag: 0,
                slots: HashMap::new(),
                abandoned: BTreeSet::new(),
                outbound: Some(tx),
                closed: None,
            }),
            inbound: Mutex::new(Inbound {
                buf: BytesMut::new(),
                inflater: FrameInflater::new(),
            }),
            on_event,
            frame_config,
            counters: Counters::default(),
        };
        (mux, OutboundQueue { rx })
    }

    /// Issue a call without waiting for the reply.
    ///
    /// The tag is registered before the frame is queued, so a reply can never
    /// arrive for a tag the table does not know yet. Frames leave in the order
    /// `call` was invoked.
    pub fn call(
        &self,
        method: impl Into<String>,
        args: Vec<Value>,
        kwargs: BTreeMap<String, Value>,
    ) -> Result<PendingCall> {
        let mut table = self.table();
        if let Some(reason) = &table.closed {
            return Err(RpcError::ConnectionClosed(reason.clone()));
        }

        let tag = table.next_tag;
        let request = Request::new(tag, method, args, kwargs)?;
        let frame = encode_request(&request)?;

        let Some(outbound) = table.outbound.clone() else {
            return Err(RpcError::ConnectionClosed("outbound queue closed".to_string()));
        };
        let (tx, rx) = oneshot::channel();
        table.slots.insert(tag, tx);
        table.next_tag = tag.wrapping_add(1);

        let size = frame.len();
        if outbound.send(frame).is_err() {
            table.slots.remove(&tag);
            return Err(RpcError::ConnectionClosed(
                "outbound queue receiver dropped".to_string(),
            ));
        }
        drop(table);

        self.counters.call_issued();
        debug!(tag, method = %request.method, bytes = size, "queued call");
        Ok(PendingCall { tag, rx })
    }

    /// Push received bytes through the decoder and dispatch every complete
    /// frame. Returns how many responses were dispatched.
    ///
    /// Frames decoded before a failure are still dispatched. A returned error
    /// is a protocol violation and the connection should not be read further.
    pub fn feed(&self, data: &[u8]) -> Result<usize> {
        if let Some(reason) = self.close_reason() {
            return Err(RpcError::ConnectionClosed(reason));
        }
        self.counters.add_received(data.len());

        let (responses, failure) = self.drain_frames(data);
        let mut dispatched = 0;
        for response in responses {
            self.dispatch(response)?;
            dispatched += 1;
        }
        match failure {
            Some(err) => Err(err.into()),
            None => Ok(dispatched),
        }
    }

    /// Give up on a call. Its handle resolves with [`RpcError::Abandoned`]
    /// and a late reply for the tag is discarded. The tag is not reused.
    ///
    /// Only the most recent [`MAX_ABANDONED_TAGS`] abandoned tags are
    /// remembered.
    pub fn abandon(&self, tag: Tag) -> bool {
        let slot = {
            let mut table = self.table();
            let slot = table.slots.remove(&tag);
            if slot.is_some() {
                table.abandoned.insert(tag);
                while table.abandoned.len() > MAX_ABANDONED_TAGS {
                    if let Some(oldest) = table.abandoned.pop_first() {
                        trace!(tag = oldest, "forgetting abandoned call");
                    }
                }
            }
            slot
        };
        match slot {
            Some(tx) => {
                let _ = tx.send(Err(RpcError::Abandoned(tag)));
                debug!(tag, "abandoned call");
                true
            }
            None => false,
        }
    }

    /// Fail every pending call with a connection-closed error and refuse new
    /// calls. Returns how many calls were failed. Only the first reason is
    /// kept.
    pub fn close(&self, reason: &str) -> usize {
        let slots = {
            let mut table = self.table();
            if table.closed.is_none() {
                table.closed = Some(reason.to_string());
            }
            table.outbound = None;
            table.abandoned.clear();
            std::mem::take(&mut table.slots)
        };

        let failed = slots.len();
        let reason = self.close_reason().unwrap_or_else(|| reason.to_string());
        for (_, tx) in slots {
            let _ = tx.send(Err(RpcError::ConnectionClosed(reason.clone())));
        }
        if failed > 0 {
            debug!(failed, reason = %reason, "failed pending calls");
        }
        failed
    }

    pub fn is_closed(&self) -> bool {
        self.table().closed.is_some()
    }

    pub fn close_reason(&self) -> Option<String> {
        self.table().closed.clone()
    }

    /// Number of calls still waiting for a reply.
    pub fn pending_count(&self) -> usize {
        self.table().slots.len()
    }

    /// Bytes held in the inbound buffer that do not yet form a frame.
    pub fn buffered_len(&self) -> usize {
        self.inbound().buf.len()
    }

    /// Account for frame bytes the write side put on the wire.
    pub fn record_sent(&self, n: usize) {
        self.counters.add_sent(n);
    }

    pub fn stats(&self) -> ClientStats {
        self.counters.snapshot()
    }

    fn drain_frames(&self, data: &[u8]) -> (Vec<Response>, Option<FrameError>) {
        let mut guard = self.inbound();
        let Inbound { buf, inflater } = &mut *guard;
        buf.extend_from_slice(data);

        let mut responses = Vec::new();
        loop {
            match inflater.decode_response(&buf[..], &self.frame_config) {
                Ok(Some((consumed, response))) => {
                    buf.advance(consumed);
                    self.counters.frame_decoded();
                    trace!(
                        kind = response.kind(),
                        bytes = consumed,
                        remaining = buf.len(),
                        "decoded frame"
                    );
                    responses.push(response);
                }
                Ok(None) => return (responses, None),
                Err(err) => return (responses, Some(err)),
            }
        }
    }

    fn dispatch(&self, response: Response) -> Result<()> {
        match response {
            Response::Result { tag, value } => self.resolve(tag, Ok(value)),
            Response::Fault { tag, error } => self.resolve(tag, Err(RpcError::Remote(error))),
            Response::Event(event) => {
                match &self.on_event {
                    Some(handler) => {
                        debug!(event = %event.name, args = event.args.len(), "dispatching event");
                        self.counters.event_dispatched();
                        handler(event);
                    }
                    None => trace!(event = %event.name, "no event handler, dropping event"),
                }
                Ok(())
            }
        }
    }

    fn resolve(&self, tag: Tag, reply: Reply) -> Result<()> {
        let slot = {
            let mut table = self.table();
            match table.slots.remove(&tag) {
                Some(tx) => tx,
                None if table.abandoned.remove(&tag) => {
                    warn!(tag, "discarding late reply for abandoned call");
                    return Ok(());
                }
                None => return Err(RpcError::UnknownTag(tag)),
            }
        };

        let outcome = if reply.is_ok() { "result" } else { "fault" };
        if slot.send(reply).is_err() {
            debug!(tag, outcome, "caller dropped handle before reply");
        } else {
            debug!(tag, outcome, "resolved call");
        }
        Ok(())
    }

    fn table(&self) -> MutexGuard<'_, PendingTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn inbound(&self) -> MutexGuard<'_, Inbound> {
        self.inbound.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Multiplexer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let table = self.table();
        f.debug_struct("Multiplexer")
            .field("next_tag", &table.next_tag)
            .field("pending", &table.slots.len())
            .field("closed", &table.closed)
            .field("has_event_handler", &self.on_event.is_some())
            .finish()
    }
}

use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time traffic counters for one connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientStats {
    /// Raw bytes handed to `feed()`.
    pub bytes_received: u64,
    /// Frame bytes written to the stream.
    pub bytes_sent: u64,
    /// Calls that were assigned a tag and queued.
    pub calls_issued: u64,
    /// Complete frames decoded from the inbound stream.
    pub frames_decoded: u64,
    /// Events delivered to the event handler.
    pub events_dispatched: u64,
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    bytes_received: AtomicU64,
    bytes_sent: AtomicU64,
    calls_issued: AtomicU64,
    frames_decoded: AtomicU64,
    events_dispatched: AtomicU64,
}

impl Counters {
    pub(crate) fn add_received(&self, n: usize) {
        self.bytes_received.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub(crate) fn add_sent(&self, n: usize) {
        self.bytes_sent.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub(crate) fn call_issued(&self) {
        self.calls_issued.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn frame_decoded(&self) {
        self.frames_decoded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn event_dispatched(&self) {
        self.events_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> ClientStats {
        ClientStats {
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            calls_issued: self.calls_issued.load(Ordering::Relaxed),
            frames_decoded: self.frames_decoded.load(Ordering::Relaxed),
            events_dispatched: self.events_dispatched.load(Ordering::Relaxed),
        }
    }
}

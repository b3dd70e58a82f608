use std::io::Write;

use bytes::Bytes;
use flate2::write::ZlibEncoder;
use flate2::{Compression, Decompress, FlushDecompress, Status};

use crate::error::{FrameError, Result};
use crate::message::{Request, Response};
use crate::rencode::{self, Value};

/// Default maximum inflated frame size: 16 MiB.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Output buffer growth step while inflating.
const INFLATE_CHUNK: usize = 4 * 1024;

/// Configuration for the envelope codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum inflated size of one frame in bytes. Default: 16 MiB.
    pub max_frame_size: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

/// Encode a request into one wire frame.
///
/// Wire format:
/// ```text
/// ┌──────────────────────────────────────────────────────┐
/// │ zlib stream (default level)                          │
/// │   rencode( [ [tag, method, args, kwargs] ] )         │
/// └──────────────────────────────────────────────────────┘
/// ```
///
/// There is no length prefix; the frame ends where the zlib stream ends.
pub fn encode_request(request: &Request) -> Result<Bytes> {
    deflate(&Value::List(vec![request.to_value()]))
}

/// Encode a response the way the daemon does: `(kind, tag_or_name, payload)`.
pub fn encode_response(response: &Response) -> Result<Bytes> {
    deflate(&response.to_value())
}

/// Try to decode one response from the front of `src`.
///
/// Returns `Ok(None)` while `src` holds only a prefix of a frame. On success
/// returns the number of bytes the frame occupied; the caller drops exactly
/// that many bytes and keeps the remainder.
///
/// Stateless; use a [`FrameInflater`] when the same frame is retried as more
/// bytes arrive.
pub fn decode_one(src: &[u8], config: &FrameConfig) -> Result<Option<(usize, Response)>> {
    FrameInflater::new().decode_response(src, config)
}

/// Try to decode one request from the front of `src` (daemon side).
pub fn decode_request(src: &[u8], config: &FrameConfig) -> Result<Option<(usize, Request)>> {
    let Some((consumed, value)) = inflate_value(src, config)? else {
        return Ok(None);
    };
    let request = match value {
        Value::List(items) => match <[Value; 1]>::try_from(items) {
            Ok([inner]) => Request::from_value(inner)?,
            Err(items) => {
                return Err(FrameError::InvalidMessage(format!(
                    "request envelope has {} entries, expected 1",
                    items.len()
                )))
            }
        },
        other => {
            return Err(FrameError::InvalidMessage(format!(
                "request envelope must be a list, got {}",
                other.type_name()
            )))
        }
    };
    Ok(Some((consumed, request)))
}

fn deflate(value: &Value) -> Result<Bytes> {
    let encoded = rencode::encode(value);
    let mut encoder = ZlibEncoder::new(
        Vec::with_capacity(encoded.len() / 2 + 16),
        Compression::default(),
    );
    encoder.write_all(&encoded)?;
    Ok(Bytes::from(encoder.finish()?))
}

fn inflate_value(src: &[u8], config: &FrameConfig) -> Result<Option<(usize, Value)>> {
    match inflate_frame(src, config)? {
        Some((consumed, inflated)) => Ok(Some((consumed, rencode::decode(&inflated)?))),
        None => Ok(None),
    }
}

/// Inflate the zlib stream at the front of `src`.
///
/// A fresh decompressor runs from offset 0 and one of three things happens:
/// - the stream end marker is reached: the frame is complete, and
///   `total_in` is how many bytes of `src` it spans;
/// - input runs out first: the frame is incomplete (`Ok(None)`);
/// - the decompressor rejects the data: the stream is corrupt.
pub fn inflate_frame(src: &[u8], config: &FrameConfig) -> Result<Option<(usize, Vec<u8>)>> {
    FrameInflater::new().inflate(src, config)
}

/// Resumable inflater for the frame at the front of a growing buffer.
///
/// The decompressor state and the output inflated so far survive an
/// incomplete result, so each call only inflates the bytes that arrived
/// since the previous one. Until a frame completes, every call must be given
/// the buffer starting at that frame's first byte. After a complete frame or
/// an error the inflater starts over for the next frame.
pub struct FrameInflater {
    inflater: Decompress,
    out: Vec<u8>,
}

impl FrameInflater {
    pub fn new() -> Self {
        Self {
            inflater: Decompress::new(true),
            out: Vec::new(),
        }
    }

    /// Bytes of the current frame already fed to the decompressor.
    pub fn consumed(&self) -> usize {
        self.inflater.total_in() as usize
    }

    /// Drop any partial frame.
    pub fn reset(&mut self) {
        self.inflater.reset(true);
        self.out = Vec::new();
    }

    /// Continue inflating the frame at the front of `src`.
    ///
    /// Same three outcomes as [`inflate_frame`].
    pub fn inflate(
        &mut self,
        src: &[u8],
        config: &FrameConfig,
    ) -> Result<Option<(usize, Vec<u8>)>> {
        if src.len() < self.consumed() {
            // The caller moved to a different buffer.
            self.reset();
        }
        let result = self.resume(src, config);
        if !matches!(result, Ok(None)) {
            self.reset();
        }
        result
    }

    /// Continue decoding the response at the front of `src`.
    pub fn decode_response(
        &mut self,
        src: &[u8],
        config: &FrameConfig,
    ) -> Result<Option<(usize, Response)>> {
        let Some((consumed, inflated)) = self.inflate(src, config)? else {
            return Ok(None);
        };
        let value = rencode::decode(&inflated)?;
        Ok(Some((consumed, Response::from_value(value)?)))
    }

    fn resume(&mut self, src: &[u8], config: &FrameConfig) -> Result<Option<(usize, Vec<u8>)>> {
        if src.is_empty() {
            return Ok(None);
        }

        let max = config.max_frame_size;
        loop {
            let out = &mut self.out;
            if out.len() == out.capacity() {
                if out.len() > max {
                    return Err(FrameError::FrameTooLarge {
                        size: out.len(),
                        max,
                    });
                }
                let grow = out
                    .len()
                    .max(INFLATE_CHUNK)
                    .min(max.saturating_add(1) - out.len());
                out.reserve_exact(grow);
            }

            let consumed = self.consumed();
            let status =
                self.inflater
                    .decompress_vec(&src[consumed..], &mut self.out, FlushDecompress::None)?;

            match status {
                Status::StreamEnd => {
                    if self.out.len() > max {
                        return Err(FrameError::FrameTooLarge {
                            size: self.out.len(),
                            max,
                        });
                    }
                    let frame_len = self.consumed();
                    return Ok(Some((frame_len, std::mem::take(&mut self.out))));
                }
                // The inflater stops short of the output capacity only when it
                // has run out of input.
                Status::Ok | Status::BufError if self.out.len() < self.out.capacity() => {
                    return Ok(None)
                }
                Status::Ok | Status::BufError => {}
            }
        }
    }
}

impl Default for FrameInflater {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FrameInflater {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameInflater")
            .field("consumed", &self.consumed())
            .field("inflated", &self.out.len())
            .finish()
    }
}

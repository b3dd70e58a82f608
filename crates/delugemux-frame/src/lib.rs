//! zlib-compressed rencode envelopes for the Deluge RPC wire protocol.
//!
//! Every message on the wire is one self-contained zlib stream wrapping a
//! rencode value. There is no length prefix: a frame ends where its zlib
//! stream ends, which is why decoding needs a decompressor that can tell
//! "stream finished" apart from "need more input" and "corrupt".
//!
//! - [`rencode`]: the structured binary encoding and its [`Value`] model
//! - [`message`]: [`Request`] and [`Response`] envelopes
//! - [`codec`]: frame encode/decode over byte buffers
//! - [`framed`]: `tokio_util::codec` adapter

pub mod codec;
pub mod error;
pub mod framed;
pub mod message;
pub mod rencode;

pub use codec::{
    decode_one, decode_request, encode_request, encode_response, inflate_frame, FrameConfig,
    FrameInflater, DEFAULT_MAX_FRAME_SIZE,
};
pub use error::{FrameError, Result};
pub use framed::EnvelopeCodec;
pub use message::{Event, Request, Response, Tag, RPC_ERROR, RPC_EVENT, RPC_RESPONSE};
pub use rencode::{FloatWidth, Value};

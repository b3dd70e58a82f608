/// Errors that can occur while encoding or decoding envelopes.
///
/// Every decode variant is unrecoverable for the stream it came from: frames
/// carry no length prefix, so there is no point at which decoding could resume.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The zlib stream is corrupt (as opposed to merely incomplete).
    #[error("corrupt compressed frame: {0}")]
    Corrupt(#[from] flate2::DecompressError),

    /// The inflated frame exceeds the configured maximum size.
    #[error("frame too large ({size} bytes inflated, max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// The rencode payload ended in the middle of a value.
    #[error("truncated rencode value at offset {offset}")]
    Truncated { offset: usize },

    /// A byte that is not a valid rencode type code.
    #[error("invalid rencode type code {code} at offset {offset}")]
    InvalidTypeCode { code: u8, offset: usize },

    /// A malformed length, integer literal or float.
    #[error("invalid rencode literal at offset {offset}: {reason}")]
    InvalidLiteral { offset: usize, reason: &'static str },

    /// An integer literal that does not fit in an `i64`.
    #[error("rencode integer out of range at offset {offset}")]
    IntegerOutOfRange { offset: usize },

    /// A dictionary key that is not a string.
    #[error("non-string dictionary key at offset {offset}")]
    NonStringKey { offset: usize },

    /// Nesting exceeds the decoder's depth limit.
    #[error("rencode nesting deeper than {max}")]
    TooDeep { max: usize },

    /// Bytes left over after the top-level value.
    #[error("{count} trailing bytes after rencode value")]
    TrailingBytes { count: usize },

    /// The envelope decoded but does not have the shape of a protocol message.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// The response discriminant is not one of RESPONSE, ERROR or EVENT.
    #[error("unknown response type {0}")]
    UnknownMessageType(i64),

    /// An I/O error from the compressor or the underlying stream.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FrameError>;

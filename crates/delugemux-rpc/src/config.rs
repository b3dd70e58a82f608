use delugemux_frame::FrameConfig;

/// Receive chunk size used by the read loop.
pub const DEFAULT_READ_CHUNK_SIZE: usize = 4096;

/// Connection driver configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Upper bound on bytes requested from the stream per read. Default: 4096.
    pub read_chunk_size: usize,
    /// Limits applied while decoding inbound frames.
    pub frame: FrameConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            frame: FrameConfig::default(),
        }
    }
}

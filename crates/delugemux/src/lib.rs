//! Multiplexed RPC client for the Deluge daemon protocol.
//!
//! Many concurrent calls share one connection; replies are matched to calls
//! by tag and server-pushed events go to an optional handler.
//!
//! # Crate Structure
//!
//! - [`transport`]: endpoints and connected duplex streams (TCP, Unix sockets)
//! - [`frame`]: rencode values and zlib-framed request/response envelopes
//! - [`rpc`]: the multiplexer and connection driver (behind `rpc` feature)

/// Re-export transport types.
pub mod transport {
    pub use delugemux_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use delugemux_frame::*;
}

/// Re-export RPC client types (requires `rpc` feature).
#[cfg(feature = "rpc")]
pub mod rpc {
    pub use delugemux_rpc::*;
}

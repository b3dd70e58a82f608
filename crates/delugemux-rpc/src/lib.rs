//! Client-side request multiplexing for the Deluge RPC protocol.
//!
//! Many concurrent calls share one connection. Each call gets a tag, its
//! frame is queued for the write loop, and the read loop feeds inbound bytes
//! back into the [`Multiplexer`], which resolves the matching [`PendingCall`]
//! or hands events to the registered handler.
//!
//! ```no_run
//! # async fn demo() -> delugemux_rpc::Result<()> {
//! use std::collections::BTreeMap;
//! use delugemux_transport::Endpoint;
//!
//! let client = delugemux_rpc::connect(&Endpoint::default()).await?;
//! let version = client.request("daemon.info", vec![], BTreeMap::new()).await?;
//! println!("{version}");
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod connector;
pub mod error;
pub mod mux;
pub mod stats;

pub use client::Client;
pub use config::{ClientConfig, DEFAULT_READ_CHUNK_SIZE};
pub use connector::{connect, connect_with_config};
pub use error::{Result, RpcError};
pub use mux::{EventHandler, Multiplexer, OutboundQueue, PendingCall, MAX_ABANDONED_TAGS};
pub use stats::ClientStats;

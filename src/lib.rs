//! Frame decoding and streaming lifecycle for OpenBCI acquisition boards.
//!
//! An OpenBCI board talks over a serial link in two dialects: a text banner
//! while it boots, then fixed 33-byte binary packets once streaming starts.
//! This crate turns that byte stream into decoded samples and batches them
//! into chunks for downstream consumers.
//!
//! # Features
//!
//! - **Resynchronizing framer**: recovers from garbage, partial reads and
//!   corrupted packets without ever treating them as errors
//! - **Lifecycle state machine**: init, ready handshake, start and stop,
//!   with the single-byte board commands written at the right moments
//! - **Watchdog**: reconnects when too many packets are dropped
//! - **Pluggable transports**: serial port (`serial` feature), any tokio I/O
//!   object, or an in-memory simulated board
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use futures::StreamExt;
//! use openbci_stream::transports::SimulatedBoard;
//! use openbci_stream::{OpenBci, SinkSet, StreamConfig};
//!
//! #[tokio::main]
//! async fn main() -> openbci_stream::Result<()> {
//!     let mut sinks = SinkSet::new();
//!     sinks.push(|chunk: &openbci_stream::Chunk| println!("{} samples", chunk.len()));
//!
//!     let handle = OpenBci::connect(SimulatedBoard::new(), StreamConfig::default(), sinks)?;
//!
//!     let mut chunks = std::pin::pin!(handle.chunks());
//!     if let Some(chunk) = chunks.next().await {
//!         let scaled = chunk.scaled();
//!         println!("first sample, channel 1: {:.2} uV", scaled[0].channel_data[0]);
//!     }
//!
//!     handle.shutdown().await
//! }
//! ```

// Core types and error handling
pub mod config;
mod error;
pub mod protocol;
#[cfg_attr(any(test, feature = "benchmark"), path = "test_utils.rs")]
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;

// Byte stream processing
pub mod aggregator;
pub mod framing;
pub mod session;
pub mod sink;
pub mod watchdog;

// Streaming runtime
pub mod connection;
pub mod driver;
pub mod transport;
pub mod transports;

// Core exports
pub use config::{EndMarkerPolicy, StreamConfig};
pub use error::*;
pub use types::*;

// Main API exports
pub use connection::StreamHandle;
pub use sink::{BroadcastSink, ChunkSink, SinkSet};
pub use transport::Transport;

/// Unified entry point for board connections.
///
/// # Examples
///
/// ## Serial port
/// ```rust,no_run
/// use openbci_stream::transports::SerialTransport;
/// use openbci_stream::{OpenBci, SinkSet, StreamConfig};
///
/// #[tokio::main]
/// async fn main() -> openbci_stream::Result<()> {
///     let config = StreamConfig::from_file("openbci.yaml")?;
///     let transport = SerialTransport::open(&config)?;
///     let handle = OpenBci::connect(transport, config, SinkSet::new())?;
///     // Use handle...
///     handle.shutdown().await
/// }
/// ```
///
/// ## Simulated board
/// ```rust,no_run
/// use openbci_stream::transports::SimulatedBoard;
/// use openbci_stream::{OpenBci, SessionState, SinkSet, StreamConfig};
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() -> openbci_stream::Result<()> {
///     let handle = OpenBci::connect(SimulatedBoard::new(), StreamConfig::default(), SinkSet::new())?;
///     handle.wait_for_state(SessionState::Streaming, Duration::from_secs(5)).await?;
///     handle.shutdown().await
/// }
/// ```
pub struct OpenBci;

impl OpenBci {
    /// Start a session over `transport`.
    ///
    /// Spawns the driver task, which with the default configuration sends
    /// init right away and starts streaming once the board reports ready.
    /// Every completed chunk goes to `sinks` in registration order.
    ///
    /// Must be called inside a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Config`] if `config` fails validation. Transport
    /// failures after this point end the driver and are reported by
    /// [`StreamHandle::shutdown`].
    pub fn connect<T: Transport>(transport: T, config: StreamConfig, sinks: SinkSet) -> Result<StreamHandle> {
        StreamHandle::spawn(transport, config, sinks)
    }

    /// Open the serial port named in `config` and start a session on it.
    ///
    /// Without the `serial` feature this returns [`StreamError::Unsupported`].
    pub fn open_serial(config: StreamConfig, sinks: SinkSet) -> Result<StreamHandle> {
        config.validate()?;
        let transport = transports::SerialTransport::open(&config)?;
        Self::connect(transport, config, sinks)
    }
}

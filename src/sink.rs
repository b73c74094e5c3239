//! Chunk sinks
//!
//! A sink receives every completed [`Chunk`]. Sinks are called on the driver
//! task, in the order they were registered, so they should hand work off
//! rather than block.
//!
//! Closures are sinks:
//!
//! ```rust
//! use openbci_stream::sink::{ChunkSink, SinkSet};
//! use openbci_stream::types::Chunk;
//!
//! let mut sinks = SinkSet::new();
//! sinks.push(|chunk: &Chunk| println!("{} samples", chunk.len()));
//! sinks.dispatch(&Chunk::default());
//! ```

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::trace;

use crate::types::Chunk;

/// Receiver of completed chunks.
pub trait ChunkSink: Send + 'static {
    /// Called once per completed chunk.
    fn on_chunk(&mut self, chunk: &Chunk);
}

impl<F> ChunkSink for F
where
    F: FnMut(&Chunk) + Send + 'static,
{
    fn on_chunk(&mut self, chunk: &Chunk) {
        self(chunk)
    }
}

/// Publishes chunks on a broadcast channel so any number of async consumers
/// can subscribe.
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    tx: broadcast::Sender<Arc<Chunk>>,
}

impl BroadcastSink {
    /// Create a sink whose channel holds up to `capacity` undelivered chunks
    /// per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<Chunk>> {
        self.tx.subscribe()
    }
}

impl ChunkSink for BroadcastSink {
    fn on_chunk(&mut self, chunk: &Chunk) {
        // No subscribers is not an error; the chunk is simply not observed.
        let receivers = self.tx.send(Arc::new(chunk.clone())).unwrap_or(0);
        trace!(receivers, "Chunk broadcast");
    }
}

/// Ordered collection of sinks.
#[derive(Default)]
pub struct SinkSet {
    sinks: Vec<Box<dyn ChunkSink>>,
}

impl SinkSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a sink after all existing ones.
    pub fn push<S: ChunkSink>(&mut self, sink: S) {
        self.sinks.push(Box::new(sink));
    }

    /// Register an already boxed sink.
    pub fn push_boxed(&mut self, sink: Box<dyn ChunkSink>) {
        self.sinks.push(sink);
    }

    /// Hand `chunk` to every sink in registration order.
    pub fn dispatch(&mut self, chunk: &Chunk) {
        for sink in &mut self.sinks {
            sink.on_chunk(chunk);
        }
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl std::fmt::Debug for SinkSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SinkSet").field("sinks", &self.sinks.len()).finish()
    }
}

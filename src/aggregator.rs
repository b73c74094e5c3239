//! Fixed-size batching of decoded samples

use tracing::trace;

use crate::types::{Chunk, Sample};

/// Collects samples until a chunk is full.
///
/// A chunk leaves the aggregator exactly when it reaches `chunk_size`
/// samples. A partial chunk only leaves through [`ChunkAggregator::flush`].
#[derive(Debug)]
pub struct ChunkAggregator {
    chunk_size: usize,
    pending: Vec<Sample>,
}

impl ChunkAggregator {
    /// Create an aggregator; a `chunk_size` of zero is treated as one.
    pub fn new(chunk_size: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self { chunk_size, pending: Vec::with_capacity(chunk_size) }
    }

    /// Append a sample, returning the chunk it completed, if any.
    pub fn push(&mut self, sample: Sample) -> Option<Chunk> {
        self.pending.push(sample);
        if self.pending.len() < self.chunk_size {
            return None;
        }

        let samples = std::mem::replace(&mut self.pending, Vec::with_capacity(self.chunk_size));
        trace!(size = samples.len(), "Chunk complete");
        Some(Chunk::new(samples))
    }

    /// Hand out whatever has accumulated, even if the chunk is not full.
    pub fn flush(&mut self) -> Option<Chunk> {
        if self.pending.is_empty() {
            return None;
        }
        let samples = std::mem::replace(&mut self.pending, Vec::with_capacity(self.chunk_size));
        Some(Chunk::new(samples))
    }

    /// Throw away the partial chunk. Returns how many samples were dropped.
    pub fn discard(&mut self) -> usize {
        let discarded = self.pending.len();
        self.pending.clear();
        discarded
    }

    /// Samples waiting for the current chunk to fill.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }
}

//! Test utilities for building wire data and recording sink output
//!
//! Shared by unit tests, integration tests and benchmarks so every suite
//! talks about the same synthetic packets.

#![cfg(any(test, feature = "benchmark"))]

use std::sync::{Arc, Mutex};

use crate::protocol::START_BYTE;
use crate::sink::ChunkSink;
use crate::types::{Chunk, Sample};

/// Deterministic sample for `id`.
///
/// Channel values alternate in sign and never produce a start-marker byte.
/// The first aux value repeats the id, so for id 0xA0 both the id byte and
/// the low aux byte are stray markers; every other fixture only contains a
/// marker where its frame begins.
pub fn sample_fixture(id: u8) -> Sample {
    let mut channel_data = [0i32; 8];
    for (channel, value) in channel_data.iter_mut().enumerate() {
        let magnitude = ((id as i32) << 4) + channel as i32 + 1;
        *value = if channel % 2 == 0 { magnitude } else { -magnitude };
    }
    Sample { id, channel_data, aux_data: [id as i16, 1000, -1000] }
}

/// Concatenate the wire packets of `samples`.
pub fn build_stream(samples: &[Sample]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_packet()).collect()
}

/// `len` bytes of deterministic noise without a start marker.
pub fn noise(len: usize) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u8).wrapping_mul(37).wrapping_add(11))
        .map(|b| if b == START_BYTE { b ^ 0x01 } else { b })
        .collect()
}

/// Install a fmt subscriber honouring `RUST_LOG`, once per process.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Sink that records every chunk it receives.
///
/// Clones share the same record, so keep one clone for assertions and hand
/// the other to the driver.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    chunks: Arc<Mutex<Vec<Chunk>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Chunks received so far.
    pub fn chunks(&self) -> Vec<Chunk> {
        self.chunks.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// All samples received so far, in order.
    pub fn samples(&self) -> Vec<Sample> {
        self.chunks().into_iter().flatten().collect()
    }
}

impl ChunkSink for RecordingSink {
    fn on_chunk(&mut self, chunk: &Chunk) {
        if let Ok(mut chunks) = self.chunks.lock() {
            chunks.push(chunk.clone());
        }
    }
}

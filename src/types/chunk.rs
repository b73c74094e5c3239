//! Batches of samples handed to sinks

use serde::{Deserialize, Serialize};
use std::ops::Deref;

use super::{Sample, ScaledSample};

/// An ordered batch of samples, delivered to sinks once full.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct Chunk {
    samples: Vec<Sample>,
}

impl Chunk {
    /// Wrap an already collected batch.
    pub fn new(samples: Vec<Sample>) -> Self {
        Self { samples }
    }

    /// The samples in arrival order.
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Take ownership of the samples.
    pub fn into_samples(self) -> Vec<Sample> {
        self.samples
    }

    /// Every sample converted to physical units.
    pub fn scaled(&self) -> Vec<ScaledSample> {
        self.samples.iter().map(Sample::scaled).collect()
    }
}

impl Deref for Chunk {
    type Target = [Sample];

    fn deref(&self) -> &Self::Target {
        &self.samples
    }
}

impl From<Vec<Sample>> for Chunk {
    fn from(samples: Vec<Sample>) -> Self {
        Self::new(samples)
    }
}

impl IntoIterator for Chunk {
    type Item = Sample;
    type IntoIter = std::vec::IntoIter<Sample>;

    fn into_iter(self) -> Self::IntoIter {
        self.samples.into_iter()
    }
}

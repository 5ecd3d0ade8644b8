//! In-memory sample source.

use super::{SampleSource, SourceError};
use std::collections::VecDeque;

/// Serves a pre-loaded trajectory in chunks.
#[derive(Debug, Clone)]
pub struct MemorySource {
    samples: VecDeque<f64>,
    sample_rate_hz: f64,
}

impl MemorySource {
    pub fn new(samples: impl Into<Vec<f64>>, sample_rate_hz: f64) -> Self {
        Self {
            samples: samples.into().into(),
            sample_rate_hz,
        }
    }

    /// Samples not yet pulled.
    pub fn remaining(&self) -> usize {
        self.samples.len()
    }
}

impl SampleSource for MemorySource {
    fn sample_rate_hz(&self) -> f64 {
        self.sample_rate_hz
    }

    fn pull(&mut self, n: usize) -> Result<Vec<f64>, SourceError> {
        if self.samples.is_empty() {
            return Err(SourceError::EndOfStream);
        }
        let take = n.max(1).min(self.samples.len());
        Ok(self.samples.drain(..take).collect())
    }
}

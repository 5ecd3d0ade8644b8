//! Channel-fed sample source.
//!
//! Lets an acquisition thread push blocks of samples while the segmenter
//! pulls them. `recv` is the only point where a run waits for data.

use super::{SampleSource, SourceError};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::collections::VecDeque;

/// Source backed by a crossbeam channel of sample blocks.
///
/// The stream ends when every sender has been dropped and the buffered
/// samples are drained.
pub struct ChannelSource {
    receiver: Receiver<Vec<f64>>,
    pending: VecDeque<f64>,
    sample_rate_hz: f64,
}

impl ChannelSource {
    /// Wrap an existing receiver.
    pub fn new(receiver: Receiver<Vec<f64>>, sample_rate_hz: f64) -> Self {
        Self {
            receiver,
            pending: VecDeque::new(),
            sample_rate_hz,
        }
    }

    /// Create a source together with the sender that feeds it.
    pub fn with_capacity(capacity: usize, sample_rate_hz: f64) -> (Sender<Vec<f64>>, Self) {
        let (sender, receiver) = bounded(capacity);
        (sender, Self::new(receiver, sample_rate_hz))
    }
}

impl SampleSource for ChannelSource {
    fn sample_rate_hz(&self) -> f64 {
        self.sample_rate_hz
    }

    fn pull(&mut self, n: usize) -> Result<Vec<f64>, SourceError> {
        // Skip empty blocks so callers always get data or end of stream.
        while self.pending.is_empty() {
            match self.receiver.recv() {
                Ok(block) => self.pending.extend(block),
                Err(_) => return Err(SourceError::EndOfStream),
            }
        }
        let take = n.max(1).min(self.pending.len());
        Ok(self.pending.drain(..take).collect())
    }
}

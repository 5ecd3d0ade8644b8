//! Lookahead buffer between the sample source and the detector.
//!
//! The feed never rewinds: samples leave it only through [`SampleFeed::next`].
//! Peeking lets the detector end an event without consuming the sample
//! that returned to baseline, and lets the pad filter inspect the upcoming
//! window while leaving it in place for the next idle phase.

use crate::source::{SampleSource, SourceError};
use std::collections::VecDeque;

/// Pull-driven view over a [`SampleSource`].
pub struct SampleFeed<S> {
    source: S,
    lookahead: VecDeque<f64>,
    chunk_size: usize,
    consumed: u64,
    exhausted: bool,
}

impl<S: SampleSource> SampleFeed<S> {
    /// Create a feed that pulls `chunk_size` samples at a time.
    pub fn new(source: S, chunk_size: usize) -> Self {
        Self {
            source,
            lookahead: VecDeque::new(),
            chunk_size: chunk_size.max(1),
            consumed: 0,
            exhausted: false,
        }
    }

    pub fn sample_rate_hz(&self) -> f64 {
        self.source.sample_rate_hz()
    }

    /// Pull one block from the source without buffering it.
    ///
    /// Returns `Ok(None)` once the source reports end of stream. The caller
    /// hands the block back through [`SampleFeed::extend`] after looking at it.
    pub fn pull_block(&mut self) -> Result<Option<Vec<f64>>, SourceError> {
        if self.exhausted {
            return Ok(None);
        }
        match self.source.pull(self.chunk_size) {
            Ok(block) => Ok(Some(block)),
            Err(SourceError::EndOfStream) => {
                self.exhausted = true;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Append a pulled block to the lookahead.
    pub fn extend(&mut self, block: Vec<f64>) {
        self.lookahead.extend(block);
    }

    /// Consume the next buffered sample.
    pub fn next(&mut self) -> Option<f64> {
        let sample = self.lookahead.pop_front()?;
        self.consumed += 1;
        Some(sample)
    }

    /// Look at the next buffered sample without consuming it.
    pub fn peek(&self) -> Option<f64> {
        self.lookahead.front().copied()
    }

    /// The first `n` buffered samples, in order.
    pub fn window(&self, n: usize) -> impl Iterator<Item = f64> + '_ {
        self.lookahead.iter().take(n).copied()
    }

    /// Number of samples waiting in the lookahead.
    pub fn buffered(&self) -> usize {
        self.lookahead.len()
    }

    /// Samples consumed so far; the index of the most recent one, 1-based.
    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    /// True once the source has reported end of stream.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }
}

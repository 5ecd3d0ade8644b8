//! Sample sources for the segmenter.
//!
//! A source is pull-based: the segmenter asks for up to `n` samples at a
//! time and treats [`SourceError::EndOfStream`] as the normal end of a run.
//! Decoding of instrument file formats lives outside this crate; the
//! sources here cover in-memory data, channel-fed streams and plain text.

pub mod channel;
pub mod memory;
pub mod text;

pub use channel::ChannelSource;
pub use memory::MemorySource;
pub use text::TextSource;

use thiserror::Error;

/// Ordered supplier of current samples (pA) at a fixed sampling rate.
pub trait SampleSource {
    /// Sampling rate of the stream in Hz.
    fn sample_rate_hz(&self) -> f64;

    /// Pull up to `n` samples in stream order.
    ///
    /// Returns a non-empty batch, or [`SourceError::EndOfStream`] once no
    /// samples remain. Implementations may block until data is ready.
    fn pull(&mut self, n: usize) -> Result<Vec<f64>, SourceError>;
}

impl<S: SampleSource + ?Sized> SampleSource for Box<S> {
    fn sample_rate_hz(&self) -> f64 {
        (**self).sample_rate_hz()
    }

    fn pull(&mut self, n: usize) -> Result<Vec<f64>, SourceError> {
        (**self).pull(n)
    }
}

/// Errors that can occur while pulling samples.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("End of stream")]
    EndOfStream,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed sample on line {line}: '{value}'")]
    Malformed { line: usize, value: String },
}

impl SourceError {
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, SourceError::EndOfStream)
    }
}

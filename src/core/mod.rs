//! Core segmentation components.
//!
//! This module contains:
//! - The fixed-capacity look-behind ring
//! - Baseline state and block-wise baseline tracking
//! - The lookahead feed over a sample source
//! - The boundary detector state machine
//! - Trailing pad cleanup
//! - Event payload assembly

pub mod assembler;
pub mod baseline;
pub mod detector;
pub mod feed;
pub mod pad;
pub mod ring;

// Re-export commonly used types
pub use assembler::{Assembly, EventAssembler, EventRecord};
pub use baseline::{
    block_statistics, BaselineSnapshot, BaselineState, BaselineTracker, DriftError, DriftStats,
};
pub use detector::{BoundaryCrossing, BoundaryDetector, DetectorState};
pub use feed::SampleFeed;
pub use pad::TrailingPadFilter;
pub use ring::PreEventBuffer;

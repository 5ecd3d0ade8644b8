//! Pore Segmenter - streaming event segmentation for ionic current recordings.
//!
//! This library partitions a continuous, high-rate current trace into
//! discrete blockade events: transient excursions below the open channel
//! baseline. Each event is padded with the surrounding open channel signal
//! and handed to a pluggable processor for characterization.
//!
//! # Guarantees
//!
//! - **Single pass**: samples are pulled once, in order, and never re-read
//! - **Bounded look-behind**: the pre-event buffer never exceeds the pad length
//! - **Self-contained events**: every dispatched event carries its own copy
//!   of the baseline and the processing settings
//! - **Ordered**: events are dispatched in stream order
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        Pore Segmenter                         │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐         │
//! │  │   Source    │──▶│  Detector   │──▶│  Pad Filter │         │
//! │  │ (pull n)    │   │ (idle/event)│   │  (k/2 SD)   │         │
//! │  └─────────────┘   └─────────────┘   └─────────────┘         │
//! │         │                                    │                │
//! │         ▼                                    ▼                │
//! │  ┌─────────────┐                     ┌─────────────┐         │
//! │  │  Baseline   │                     │  Assembler  │──▶ Dispatch
//! │  │  Tracker    │                     │ (min length)│         │
//! │  └─────────────┘                     └─────────────┘         │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use pore_segmenter::{
//!     Config, EventSegmenter, InlineDispatcher, JsonLinesWriter, MemorySource,
//! };
//!
//! let samples = vec![100.0; 10_000];
//! let source = MemorySource::new(samples, 100_000.0);
//! let dispatcher = InlineDispatcher::new(JsonLinesWriter::new(std::io::stdout()));
//!
//! let mut segmenter = EventSegmenter::new(&Config::default(), source, dispatcher)
//!     .expect("valid configuration");
//! let summary = segmenter.run().expect("run completes");
//! println!("{}", summary.report());
//! ```

pub mod config;
pub mod core;
pub mod dispatch;
pub mod segmenter;
pub mod source;

// Re-export key types at crate root for convenience
pub use config::{
    AlgorithmSettings, Config, ConfigError, DispatchConfig, DriftLimits, EndOfStreamPolicy,
    SegmentConfig,
};
pub use core::{
    BaselineSnapshot, BaselineState, BaselineTracker, BoundaryDetector, EventAssembler,
    EventRecord, PreEventBuffer, TrailingPadFilter,
};
pub use dispatch::{
    Dispatch, DispatchStats, EventProcessor, EventSummary, InlineDispatcher, JsonLinesWriter,
    ProcessError, WorkerPool,
};
pub use segmenter::{
    CancelHandle, EventSegmenter, RunSummary, SegmentError, SegmentStats, StopReason,
};
pub use source::{ChannelSource, MemorySource, SampleSource, SourceError, TextSource};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

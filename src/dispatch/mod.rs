//! Dispatch boundary between the segmenter and event characterization.
//!
//! The segmenter hands every accepted [`EventRecord`] to a [`Dispatch`]
//! implementation and moves on; it never waits for the result. Any
//! concurrency or backpressure policy belongs here, not in the detector.

pub mod counters;
pub mod inline;
pub mod jsonl;
pub mod pool;

pub use counters::{DispatchCounters, DispatchStats, SharedDispatchCounters};
pub use inline::InlineDispatcher;
pub use jsonl::{EventSummary, JsonLinesWriter};
pub use pool::WorkerPool;

use crate::core::EventRecord;
use std::sync::Arc;
use thiserror::Error;

/// Downstream characterization of a single event.
///
/// Implementations own the record they receive and may run on any thread.
pub trait EventProcessor: Send + Sync {
    fn process(&self, event: EventRecord) -> Result<(), ProcessError>;
}

impl<P: EventProcessor + ?Sized> EventProcessor for Arc<P> {
    fn process(&self, event: EventRecord) -> Result<(), ProcessError> {
        (**self).process(event)
    }
}

/// Fire-and-forget hand-off of accepted events.
pub trait Dispatch {
    /// Hand one event downstream. Must not block on its processing, though
    /// it may block when the boundary applies backpressure.
    fn dispatch(&mut self, event: EventRecord);

    /// Events the downstream side has finished with so far.
    fn processed_count(&self) -> u64;
}

impl<D: Dispatch + ?Sized> Dispatch for Box<D> {
    fn dispatch(&mut self, event: EventRecord) {
        (**self).dispatch(event)
    }

    fn processed_count(&self) -> u64 {
        (**self).processed_count()
    }
}

/// Errors raised by an event processor.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Processing failed: {0}")]
    Failed(String),
}

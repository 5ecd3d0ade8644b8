//! Synchronous dispatch on the segmenter's own thread.

use super::{Dispatch, DispatchCounters, DispatchStats, EventProcessor};
use crate::core::EventRecord;

/// Calls the processor directly for every event.
///
/// Processor failures are logged and counted; they never stop the run.
pub struct InlineDispatcher<P> {
    processor: P,
    counters: DispatchCounters,
}

impl<P: EventProcessor> InlineDispatcher<P> {
    pub fn new(processor: P) -> Self {
        Self {
            processor,
            counters: DispatchCounters::new(),
        }
    }

    pub fn processor(&self) -> &P {
        &self.processor
    }

    pub fn stats(&self) -> DispatchStats {
        self.counters.stats()
    }

    pub fn into_processor(self) -> P {
        self.processor
    }
}

impl<P: EventProcessor> Dispatch for InlineDispatcher<P> {
    fn dispatch(&mut self, event: EventRecord) {
        self.counters.record_dispatched();
        let sequence = event.sequence;
        match self.processor.process(event) {
            Ok(()) => self.counters.record_processed(),
            Err(e) => {
                tracing::warn!("Event {} processing failed: {}", sequence, e);
                self.counters.record_failed();
            }
        }
    }

    fn processed_count(&self) -> u64 {
        self.counters.processed()
    }
}

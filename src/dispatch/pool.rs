//! Worker pool dispatch over a bounded crossbeam channel.
//!
//! Each event travels to exactly one worker and is owned by it from then
//! on. A full queue blocks [`Dispatch::dispatch`], which is the only
//! backpressure the segmenter ever sees.

use super::{
    Dispatch, DispatchCounters, DispatchStats, EventProcessor, SharedDispatchCounters,
};
use crate::core::EventRecord;
use crossbeam_channel::{bounded, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Fixed set of threads characterizing events in parallel.
pub struct WorkerPool {
    sender: Option<Sender<EventRecord>>,
    workers: Vec<JoinHandle<()>>,
    counters: SharedDispatchCounters,
}

impl WorkerPool {
    /// Start `workers` threads sharing `processor`.
    pub fn spawn(
        processor: Arc<dyn EventProcessor>,
        workers: usize,
        queue_capacity: usize,
    ) -> std::io::Result<Self> {
        let (sender, receiver) = bounded::<EventRecord>(queue_capacity.max(1));
        let counters: SharedDispatchCounters = Arc::new(DispatchCounters::new());

        let mut handles = Vec::with_capacity(workers.max(1));
        for worker_id in 0..workers.max(1) {
            let receiver = receiver.clone();
            let processor = Arc::clone(&processor);
            let counters = Arc::clone(&counters);

            let handle = thread::Builder::new()
                .name(format!("event-worker-{worker_id}"))
                .spawn(move || {
                    for event in receiver.iter() {
                        let sequence = event.sequence;
                        match processor.process(event) {
                            Ok(()) => counters.record_processed(),
                            Err(e) => {
                                tracing::warn!(
                                    "Worker {} failed on event {}: {}",
                                    worker_id,
                                    sequence,
                                    e
                                );
                                counters.record_failed();
                            }
                        }
                    }
                    tracing::debug!("Worker {} exiting", worker_id);
                })?;
            handles.push(handle);
        }

        Ok(Self {
            sender: Some(sender),
            workers: handles,
            counters,
        })
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub fn stats(&self) -> DispatchStats {
        self.counters.stats()
    }

    /// Close the queue, let workers drain it and wait for them.
    pub fn shutdown(mut self) -> DispatchStats {
        self.close();
        self.counters.stats()
    }

    fn close(&mut self) {
        // Dropping the last sender ends every worker's receive loop.
        self.sender.take();
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                tracing::error!("Event worker panicked");
            }
        }
    }
}

impl Dispatch for WorkerPool {
    fn dispatch(&mut self, event: EventRecord) {
        let Some(sender) = &self.sender else {
            tracing::warn!("Dropping event {}: worker pool is shut down", event.sequence);
            return;
        };
        self.counters.record_dispatched();
        if let Err(e) = sender.send(event) {
            tracing::error!("Dropping event {}: no workers running", e.0.sequence);
            self.counters.record_failed();
        }
    }

    fn processed_count(&self) -> u64 {
        self.counters.processed()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.close();
    }
}

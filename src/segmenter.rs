//! Single-pass event segmentation over a sample stream.
//!
//! [`EventSegmenter`] pulls samples through the lookahead feed, drives the
//! boundary detector, cleans the trailing pad, assembles accepted events
//! and hands them to the dispatcher. It is strictly sequential: events are
//! dispatched in stream order and nothing is ever re-read.
//!
//! ```text
//! SampleSource ──▶ SampleFeed ──▶ BoundaryDetector ──▶ TrailingPadFilter
//!                     │                                      │
//!                     ▼                                      ▼
//!              BaselineTracker                        EventAssembler ──▶ Dispatch
//! ```

use crate::config::{AlgorithmSettings, Config, ConfigError, EndOfStreamPolicy, SegmentConfig};
use crate::core::{
    Assembly, BaselineSnapshot, BaselineState, BaselineTracker, BoundaryCrossing,
    BoundaryDetector, DetectorState, DriftStats, EventAssembler, SampleFeed, TrailingPadFilter,
};
use crate::dispatch::Dispatch;
use crate::source::{SampleSource, SourceError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Errors that abort a run.
#[derive(Debug, Error)]
pub enum SegmentError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Sample source error: {0}")]
    Source(#[from] SourceError),
}

/// Why a run stopped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum StopReason {
    /// The source ran out of samples
    Exhausted,
    /// The run was cancelled through its [`CancelHandle`]
    Cancelled,
    /// The baseline tracker rejected a block
    ExcessiveDrift { message: String },
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::Exhausted => write!(f, "end of data"),
            StopReason::Cancelled => write!(f, "cancelled"),
            StopReason::ExcessiveDrift { message } => write!(f, "excessive drift: {message}"),
        }
    }
}

/// Stops a run from another thread. Cancelling twice is harmless.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Counters of a segmentation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentStats {
    /// Samples consumed from the stream
    pub samples_consumed: u64,
    /// Events long enough to be dispatched
    pub accepted: u64,
    /// Boundary crossings shorter than the minimum length
    pub rejected: u64,
    /// Unfinished events dropped at end of stream
    pub discarded_partial: u64,
    /// Events the dispatch boundary reports as processed
    pub processed: u64,
}

/// Result of a completed run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub stop_reason: StopReason,
    pub stats: SegmentStats,
    /// Baseline in effect when the run stopped
    pub baseline: Option<BaselineSnapshot>,
    pub drift: DriftStats,
}

impl RunSummary {
    /// Get a summary string for display.
    pub fn report(&self) -> String {
        let mut out = String::from("Baseline open channel conductance:\n");
        match self.baseline {
            Some(b) => out.push_str(&format!(
                "- Mean = {:.2} pA\n- SD = {:.2} pA\n- Slope = {:.2} pA/s\n",
                b.mean, b.sd, b.slope
            )),
            None => out.push_str("- not established\n"),
        }
        out.push_str(&format!(
            "Event segment stats:\n\
             - Events detected = {}\n\
             - Events rejected (too short) = {}\n\
             - Partial events discarded = {}\n\
             - Events processed = {}\n\
             - Samples consumed = {}\n\
             - Open channel drift (max) = {:.2} * SD\n",
            self.stats.accepted,
            self.stats.rejected,
            self.stats.discarded_partial,
            self.stats.processed,
            self.stats.samples_consumed,
            self.drift.max_drift_sd,
        ));
        if let (Some(min), Some(max)) = (self.drift.min_slope, self.drift.max_slope) {
            out.push_str(&format!(
                "- Open channel drift rate (min/max) = ({min:.2}/{max:.2}) pA/s\n"
            ));
        }
        out.push_str(&format!("Stopped: {}", self.stop_reason));
        out
    }
}

/// Internal control flow of the pull loop.
enum Halt {
    Stop(StopReason),
    Source(SourceError),
}

/// Streaming event segmenter.
pub struct EventSegmenter<S, D> {
    config: SegmentConfig,
    feed: SampleFeed<S>,
    tracker: BaselineTracker,
    baseline: Option<BaselineState>,
    detector: BoundaryDetector,
    assembler: EventAssembler,
    dispatcher: D,
    cancel: CancelHandle,
    rejected: u64,
    discarded_partial: u64,
}

impl<S: SampleSource, D: Dispatch> EventSegmenter<S, D> {
    /// Build a segmenter from a full configuration.
    pub fn new(config: &Config, source: S, dispatcher: D) -> Result<Self, SegmentError> {
        config.validate()?;
        Self::with_settings(
            config.segment.clone(),
            config.processing.clone(),
            source,
            dispatcher,
        )
    }

    /// Build a segmenter from segmentation parameters and the settings
    /// snapshot forwarded with every event.
    pub fn with_settings(
        config: SegmentConfig,
        settings: AlgorithmSettings,
        source: S,
        dispatcher: D,
    ) -> Result<Self, SegmentError> {
        config.validate()?;

        let sample_rate_hz = source.sample_rate_hz();
        let tracker = BaselineTracker::new(&config, sample_rate_hz);
        let baseline = tracker.current();
        let detector = BoundaryDetector::new(
            config.pad_length,
            config.threshold_sigma,
            &baseline.unwrap_or_else(|| BaselineState::new(0.0, 0.0, 0.0)),
        );
        let assembler = EventAssembler::new(
            config.min_event_length,
            config.write_event_ts,
            sample_rate_hz,
            settings,
        );
        let feed = SampleFeed::new(source, config.block_size(sample_rate_hz));

        Ok(Self {
            config,
            feed,
            tracker,
            baseline,
            detector,
            assembler,
            dispatcher,
            cancel: CancelHandle::new(),
            rejected: 0,
            discarded_partial: 0,
        })
    }

    /// Handle that stops the pull loop before the next sample.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Baseline currently used for thresholding.
    pub fn baseline(&self) -> Option<BaselineState> {
        self.baseline
    }

    /// Replace the baseline statistics.
    ///
    /// In automatic mode the next measured window replaces them again. A
    /// baseline fixed by configuration stays replaced.
    pub fn set_baseline(&mut self, baseline: BaselineState) {
        self.apply_baseline(baseline);
    }

    /// Current number of look-behind samples.
    pub fn pre_event_len(&self) -> usize {
        self.detector.ring().len()
    }

    pub fn detector_state(&self) -> DetectorState {
        self.detector.state()
    }

    pub fn stats(&self) -> SegmentStats {
        SegmentStats {
            samples_consumed: self.feed.consumed(),
            accepted: self.assembler.accepted(),
            rejected: self.rejected,
            discarded_partial: self.discarded_partial,
            processed: self.dispatcher.processed_count(),
        }
    }

    pub fn dispatcher(&self) -> &D {
        &self.dispatcher
    }

    pub fn into_dispatcher(self) -> D {
        self.dispatcher
    }

    /// Segment the stream until it is exhausted, cancelled or drifts.
    pub fn run(&mut self) -> Result<RunSummary, SegmentError> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        tracing::info!(
            "Run {} started at {} Hz (threshold {} SD, pad {}, min length {})",
            run_id,
            self.feed.sample_rate_hz(),
            self.config.threshold_sigma,
            self.config.pad_length,
            self.config.min_event_length
        );

        let stop_reason = loop {
            match self.step() {
                Ok(()) => {}
                Err(Halt::Stop(reason)) => break reason,
                Err(Halt::Source(e)) => {
                    tracing::error!("Run {} aborted: {}", run_id, e);
                    return Err(e.into());
                }
            }
        };

        let stats = self.stats();
        tracing::info!(
            "Run {} stopped ({}): {} accepted, {} rejected, {} samples",
            run_id,
            stop_reason,
            stats.accepted,
            stats.rejected,
            stats.samples_consumed
        );

        Ok(RunSummary {
            run_id,
            started_at,
            finished_at: Utc::now(),
            stop_reason,
            stats,
            baseline: self.baseline.map(|b| b.snapshot()),
            drift: self.tracker.drift_stats(),
        })
    }

    /// Consume one idle sample and, if it opens an event, handle the event.
    fn step(&mut self) -> Result<(), Halt> {
        if self.cancel.is_cancelled() {
            return Err(Halt::Stop(StopReason::Cancelled));
        }

        let sample = self.next_sample()?;
        let index = self.feed.consumed();
        if self.detector.observe(sample, index) == DetectorState::InEvent {
            self.handle_event()?;
        }
        Ok(())
    }

    fn handle_event(&mut self) -> Result<(), Halt> {
        // The sample that ends the run is consumed here and never observed
        // by the idle state again. It leads the trailing-pad window.
        let mut ending = None;
        if self.detector.wants_more() {
            loop {
                if self.cancel.is_cancelled() {
                    self.discard_in_event("run cancelled");
                    return Err(Halt::Stop(StopReason::Cancelled));
                }
                match self.peek_sample() {
                    Ok(Some(sample)) if self.detector.continues(sample) => {
                        self.feed.next();
                        self.detector.extend(sample);
                    }
                    Ok(Some(sample)) => {
                        self.feed.next();
                        ending = Some(sample);
                        break;
                    }
                    Ok(None) => return self.end_of_stream_in_event(),
                    Err(halt) => {
                        self.discard_in_event("run stopped");
                        return Err(halt);
                    }
                }
            }
        }

        let crossing = self.detector.finish();

        let needed = self.config.pad_length.saturating_sub(usize::from(ending.is_some()));
        while self.feed.buffered() < needed {
            match self.refill() {
                Ok(true) => {}
                Ok(false) => break,
                Err(halt) => {
                    self.discarded_partial += 1;
                    tracing::warn!(
                        "Discarding event at {}: run stopped inside its trailing pad",
                        crossing.absolute_start_index
                    );
                    return Err(halt);
                }
            }
        }
        if self.feed.buffered() < needed
            && self.config.end_of_stream == EndOfStreamPolicy::Discard
        {
            self.discarded_partial += 1;
            tracing::warn!(
                "Discarding event at {}: stream ended inside its trailing pad",
                crossing.absolute_start_index
            );
            return Err(Halt::Stop(StopReason::Exhausted));
        }

        let pad = self.trailing_pad(ending);
        self.finalize(crossing, pad);
        Ok(())
    }

    fn end_of_stream_in_event(&mut self) -> Result<(), Halt> {
        match self.config.end_of_stream {
            EndOfStreamPolicy::Discard => self.discard_in_event("stream ended"),
            EndOfStreamPolicy::Flush => {
                let crossing = self.detector.finish();
                let pad = self.trailing_pad(None);
                self.finalize(crossing, pad);
            }
        }
        Err(Halt::Stop(StopReason::Exhausted))
    }

    fn discard_in_event(&mut self, cause: &str) {
        let dropped = self.detector.abandon();
        self.discarded_partial += 1;
        tracing::warn!("Discarding unfinished event of {} samples: {}", dropped, cause);
    }

    /// Filter the `pad_length` samples following the run, starting with
    /// the sample that ended it.
    fn trailing_pad(&self, ending: Option<f64>) -> Vec<f64> {
        let Some(baseline) = self.baseline else {
            return Vec::new();
        };
        let window = ending
            .into_iter()
            .chain(self.feed.window(self.config.pad_length))
            .take(self.config.pad_length);
        TrailingPadFilter::new(&baseline, self.config.threshold_sigma).filter(window)
    }

    fn finalize(&mut self, crossing: BoundaryCrossing, pad: Vec<f64>) {
        let baseline = self
            .baseline
            .map(|b| b.snapshot())
            .unwrap_or(BaselineSnapshot {
                mean: 0.0,
                sd: 0.0,
                slope: 0.0,
            });
        let start = crossing.absolute_start_index;

        match self.assembler.assemble(crossing, pad, baseline) {
            Assembly::Accepted(event) => {
                tracing::debug!(
                    "Event {} at {}: {} samples",
                    event.sequence,
                    start,
                    event.run_length()
                );
                self.dispatcher.dispatch(event);
            }
            Assembly::Rejected { run_length } => {
                self.rejected += 1;
                tracing::debug!("Rejected event at {}: {} samples", start, run_length);
            }
        }
    }

    fn next_sample(&mut self) -> Result<f64, Halt> {
        // No sample is judged before a baseline exists to judge it by.
        while self.baseline.is_none() && self.refill()? {}

        loop {
            if let Some(sample) = self.feed.next() {
                return Ok(sample);
            }
            if !self.refill()? {
                return Err(Halt::Stop(StopReason::Exhausted));
            }
        }
    }

    fn peek_sample(&mut self) -> Result<Option<f64>, Halt> {
        loop {
            if let Some(sample) = self.feed.peek() {
                return Ok(Some(sample));
            }
            if !self.refill()? {
                return Ok(None);
            }
        }
    }

    /// Pull the next block, feed it to the baseline tracker and buffer it.
    ///
    /// Returns `false` at end of stream.
    fn refill(&mut self) -> Result<bool, Halt> {
        let Some(block) = self.feed.pull_block().map_err(Halt::Source)? else {
            if let Some(baseline) = self.tracker.finish() {
                self.apply_baseline(baseline);
            }
            return Ok(false);
        };

        match self.tracker.update(&block) {
            Ok(Some(baseline)) => self.apply_baseline(baseline),
            Ok(None) => {}
            Err(drift) => {
                tracing::warn!("Stopping run: {}", drift);
                return Err(Halt::Stop(StopReason::ExcessiveDrift {
                    message: drift.to_string(),
                }));
            }
        }

        self.feed.extend(block);
        Ok(true)
    }

    fn apply_baseline(&mut self, baseline: BaselineState) {
        if self.baseline != Some(baseline) {
            tracing::debug!(
                "Baseline mean {:.2} pA, SD {:.2} pA, slope {:.2} pA/s",
                baseline.mean,
                baseline.sd,
                baseline.slope
            );
        }
        self.detector.set_baseline(&baseline);
        self.baseline = Some(baseline);
    }
}

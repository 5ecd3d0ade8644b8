//! Event payload assembly.
//!
//! Joins look-behind, in-event run and cleaned trailing pad into one
//! self-contained [`EventRecord`]. Offsets into the payload are 1-based:
//! `start_offset` is the position of the first run sample and `end_offset`
//! is one past the last.

use crate::config::AlgorithmSettings;
use crate::core::baseline::BaselineSnapshot;
use crate::core::detector::BoundaryCrossing;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A padded event handed to the downstream processor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    /// Unique identifier
    pub id: Uuid,
    /// Accepted-event count at dispatch, starting at 1
    pub sequence: u64,
    /// Lead pad + run + trailing pad (pA)
    pub samples: Vec<f64>,
    /// Sampling rate of the payload
    pub sample_rate_hz: f64,
    /// 1-based position of the first in-event sample
    pub start_offset: usize,
    /// 1-based position one past the last in-event sample
    pub end_offset: usize,
    /// Baseline at dispatch time
    pub baseline: BaselineSnapshot,
    /// Processing settings at dispatch time
    pub settings: AlgorithmSettings,
    /// Whether the raw time series should be retained
    pub persist_raw_series: bool,
    /// Stream index of the event start including the look-behind
    pub absolute_start_index: i64,
    /// Wall-clock time the event was assembled
    pub detected_at: DateTime<Utc>,
}

impl EventRecord {
    /// The in-event samples.
    pub fn event_samples(&self) -> &[f64] {
        &self.samples[self.start_offset - 1..self.end_offset - 1]
    }

    /// The look-behind portion.
    pub fn lead_pad(&self) -> &[f64] {
        &self.samples[..self.start_offset - 1]
    }

    /// The cleaned trailing pad.
    pub fn trailing_pad(&self) -> &[f64] {
        &self.samples[self.end_offset - 1..]
    }

    pub fn run_length(&self) -> usize {
        self.end_offset - self.start_offset
    }

    /// Event duration in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate_hz > 0.0 {
            self.run_length() as f64 / self.sample_rate_hz
        } else {
            0.0
        }
    }
}

/// Outcome of assembling one boundary crossing.
#[derive(Debug, Clone)]
pub enum Assembly {
    /// Long enough; ready for dispatch
    Accepted(EventRecord),
    /// Shorter than the minimum event length
    Rejected { run_length: usize },
}

/// Validates event length and builds padded payloads.
#[derive(Debug, Clone)]
pub struct EventAssembler {
    min_event_length: usize,
    persist_raw_series: bool,
    sample_rate_hz: f64,
    settings: AlgorithmSettings,
    accepted: u64,
}

impl EventAssembler {
    pub fn new(
        min_event_length: usize,
        persist_raw_series: bool,
        sample_rate_hz: f64,
        settings: AlgorithmSettings,
    ) -> Self {
        Self {
            min_event_length,
            persist_raw_series,
            sample_rate_hz,
            settings,
            accepted: 0,
        }
    }

    /// Number of events accepted so far.
    pub fn accepted(&self) -> u64 {
        self.accepted
    }

    /// Build the payload for a crossing, or reject it as too short.
    ///
    /// `baseline` is captured by value so later recomputation cannot reach
    /// an event already handed off.
    pub fn assemble(
        &mut self,
        crossing: BoundaryCrossing,
        trailing_pad: Vec<f64>,
        baseline: BaselineSnapshot,
    ) -> Assembly {
        let run_length = crossing.run.len();
        if run_length < self.min_event_length {
            return Assembly::Rejected { run_length };
        }
        self.accepted += 1;

        let lead = crossing.lead_pad.len();
        let mut samples = crossing.lead_pad;
        samples.reserve(run_length + trailing_pad.len());
        samples.extend(crossing.run);
        samples.extend(trailing_pad);

        Assembly::Accepted(EventRecord {
            id: Uuid::new_v4(),
            sequence: self.accepted,
            samples,
            sample_rate_hz: self.sample_rate_hz,
            start_offset: lead + 1,
            end_offset: lead + run_length + 1,
            baseline,
            settings: self.settings.clone(),
            persist_raw_series: self.persist_raw_series,
            absolute_start_index: crossing.absolute_start_index,
            detected_at: Utc::now(),
        })
    }
}

//! Event boundary detection.
//!
//! Two states. While [`DetectorState::Idle`], every sample goes into the
//! look-behind ring and is compared against the global threshold
//! `|mean| - k * |sd|`. A sample below it opens an event; from then on the
//! ring is frozen and its average magnitude (the local baseline) decides
//! when the current has returned to the open channel level.

use crate::core::baseline::BaselineState;
use crate::core::ring::PreEventBuffer;

/// Detector state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorState {
    /// Watching for a threshold crossing
    Idle,
    /// Accumulating the samples of an event
    InEvent,
}

/// A completed in-event run together with its look-behind.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryCrossing {
    /// Ring contents at the moment the event opened
    pub lead_pad: Vec<f64>,
    /// Triggering sample through the last sample below the local baseline
    pub run: Vec<f64>,
    /// Index the event starts at including the look-behind
    pub absolute_start_index: i64,
    /// Return-to-baseline level used for this event
    pub local_baseline: f64,
}

/// Threshold state machine feeding the look-behind ring.
#[derive(Debug, Clone)]
pub struct BoundaryDetector {
    state: DetectorState,
    threshold_sigma: f64,
    threshold: f64,
    fallback_baseline: f64,
    ring: PreEventBuffer,
    run: Vec<f64>,
    local_baseline: f64,
    absolute_start_index: i64,
}

impl BoundaryDetector {
    /// Create an idle detector with a look-behind of `pad_length` samples.
    pub fn new(pad_length: usize, threshold_sigma: f64, baseline: &BaselineState) -> Self {
        Self {
            state: DetectorState::Idle,
            threshold_sigma,
            threshold: baseline.threshold(threshold_sigma),
            fallback_baseline: baseline.magnitude(),
            ring: PreEventBuffer::new(pad_length),
            run: Vec::new(),
            local_baseline: 0.0,
            absolute_start_index: 0,
        }
    }

    /// Pick up new baseline statistics. Affects the next threshold check.
    pub fn set_baseline(&mut self, baseline: &BaselineState) {
        self.threshold = baseline.threshold(self.threshold_sigma);
        self.fallback_baseline = baseline.magnitude();
    }

    pub fn state(&self) -> DetectorState {
        self.state
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn ring(&self) -> &PreEventBuffer {
        &self.ring
    }

    /// Length of the in-event run so far.
    pub fn run_len(&self) -> usize {
        self.run.len()
    }

    /// Return-to-baseline level of the open event.
    pub fn local_baseline(&self) -> f64 {
        self.local_baseline
    }

    /// Feed an idle-state sample.
    ///
    /// `global_index` is the 1-based position of the sample in the stream.
    /// Returns the new state; [`DetectorState::InEvent`] means this sample
    /// opened an event.
    pub fn observe(&mut self, sample: f64, global_index: u64) -> DetectorState {
        debug_assert_eq!(self.state, DetectorState::Idle);

        self.ring.push(sample);

        if sample.abs() < self.threshold {
            self.state = DetectorState::InEvent;
            self.run.clear();
            self.run.push(sample);
            self.absolute_start_index = global_index as i64 - self.ring.len() as i64 - 1;
            // An empty ring only happens with a zero pad; fall back to the
            // global baseline so the average is always defined.
            self.local_baseline = self
                .ring
                .mean()
                .map_or(self.fallback_baseline, f64::abs);
        }

        self.state
    }

    /// Whether `sample` is still below the local baseline.
    pub fn continues(&self, sample: f64) -> bool {
        sample.abs() < self.local_baseline
    }

    /// Whether the run should look at another sample.
    pub fn wants_more(&self) -> bool {
        self.run.last().is_some_and(|&last| self.continues(last))
    }

    /// Append a sample to the open run.
    pub fn extend(&mut self, sample: f64) {
        debug_assert_eq!(self.state, DetectorState::InEvent);
        self.run.push(sample);
    }

    /// Close the open event and return to idle.
    ///
    /// The ring is cleared so look-behind never spans two events.
    pub fn finish(&mut self) -> BoundaryCrossing {
        let crossing = BoundaryCrossing {
            lead_pad: self.ring.to_vec(),
            run: std::mem::take(&mut self.run),
            absolute_start_index: self.absolute_start_index,
            local_baseline: self.local_baseline,
        };
        self.ring.clear();
        self.state = DetectorState::Idle;
        crossing
    }

    /// Drop the open event without producing a crossing.
    ///
    /// Returns the number of run samples discarded.
    pub fn abandon(&mut self) -> usize {
        let dropped = self.run.len();
        self.run.clear();
        self.ring.clear();
        self.state = DetectorState::Idle;
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector(pad: usize) -> BoundaryDetector {
        BoundaryDetector::new(pad, 3.0, &BaselineState::new(100.0, 5.0, 0.0))
    }

    #[test]
    fn test_idle_fills_ring() {
        let mut det = detector(3);
        for (i, v) in [100.0, 101.0, 99.0, 100.0].into_iter().enumerate() {
            assert_eq!(det.observe(v, i as u64 + 1), DetectorState::Idle);
        }
        assert_eq!(det.ring().to_vec(), vec![101.0, 99.0, 100.0]);
        assert_eq!(det.threshold(), 85.0);
    }

    #[test]
    fn test_trigger_and_local_baseline() {
        let mut det = detector(3);
        det.observe(100.0, 1);
        det.observe(100.0, 2);
        det.observe(100.0, 3);
        assert_eq!(det.observe(50.0, 4), DetectorState::InEvent);

        // Ring includes the triggering sample: (100 + 100 + 50) / 3.
        assert!((det.local_baseline() - 250.0 / 3.0).abs() < 1e-9);
        assert!(det.continues(50.0));
        assert!(!det.continues(90.0));
        assert!(det.wants_more());

        det.extend(55.0);
        let crossing = det.finish();
        assert_eq!(crossing.lead_pad, vec![100.0, 100.0, 50.0]);
        assert_eq!(crossing.run, vec![50.0, 55.0]);
        assert_eq!(crossing.absolute_start_index, 0);
        assert_eq!(det.state(), DetectorState::Idle);
        assert!(det.ring().is_empty());
    }

    #[test]
    fn test_negative_currents_use_magnitude() {
        let mut det = BoundaryDetector::new(2, 3.0, &BaselineState::new(-100.0, 5.0, 0.0));
        det.observe(-100.0, 1);
        assert_eq!(det.observe(-50.0, 2), DetectorState::InEvent);
        assert!((det.local_baseline() - 75.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_ring_falls_back_to_global_baseline() {
        let mut det = detector(0);
        assert_eq!(det.observe(10.0, 1), DetectorState::InEvent);
        assert_eq!(det.local_baseline(), 100.0);
        assert_eq!(det.finish().lead_pad, Vec::<f64>::new());
    }

    #[test]
    fn test_degenerate_threshold_never_triggers() {
        let mut det = BoundaryDetector::new(4, 6.0, &BaselineState::new(10.0, 5.0, 0.0));
        for i in 0..10 {
            assert_eq!(det.observe(0.0, i + 1), DetectorState::Idle);
        }
        assert!(det.ring().len() <= 4);
    }

    #[test]
    fn test_abandon_clears_state() {
        let mut det = detector(3);
        det.observe(100.0, 1);
        det.observe(40.0, 2);
        det.extend(40.0);
        assert_eq!(det.abandon(), 2);
        assert_eq!(det.state(), DetectorState::Idle);
        assert!(det.ring().is_empty());
    }

    #[test]
    fn test_set_baseline_moves_threshold() {
        let mut det = detector(3);
        det.set_baseline(&BaselineState::new(200.0, 10.0, 0.0));
        assert_eq!(det.threshold(), 170.0);
        assert_eq!(det.observe(150.0, 1), DetectorState::InEvent);
    }
}

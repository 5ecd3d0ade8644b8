//! Trailing pad cleanup.
//!
//! The window that follows an event may already contain the start of the
//! next blockade or stray spikes. Samples whose magnitude lies more than
//! `k / 2` standard deviations from the baseline are left out. The window
//! itself is fixed; excluded samples are not replaced.

use crate::core::baseline::BaselineState;

/// Filter applied to the samples following an event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrailingPadFilter {
    center: f64,
    half_width: f64,
}

impl TrailingPadFilter {
    /// Build the filter for the event trigger multiplier `threshold_sigma`.
    pub fn new(baseline: &BaselineState, threshold_sigma: f64) -> Self {
        Self {
            center: baseline.mean.abs(),
            half_width: threshold_sigma / 2.0 * baseline.sd.abs(),
        }
    }

    /// True when the sample is consistent with the open channel.
    pub fn accepts(&self, sample: f64) -> bool {
        (sample.abs() - self.center).abs() <= self.half_width
    }

    /// Keep the baseline-consistent samples of `window`, in order.
    pub fn filter(&self, window: impl IntoIterator<Item = f64>) -> Vec<f64> {
        window.into_iter().filter(|&s| self.accepts(s)).collect()
    }
}

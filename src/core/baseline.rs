//! Open channel baseline state and block-wise tracking.
//!
//! The segmenter only reads the current [`BaselineState`]. The
//! [`BaselineTracker`] is the component that refreshes it: every block of
//! samples pulled from the source yields a new mean, SD and slope, unless
//! the configuration pins them, and is checked for excessive drift.

use crate::config::{DriftLimits, SegmentConfig};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use thiserror::Error;

/// Immutable copy of the baseline attached to a dispatched event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BaselineSnapshot {
    /// Open channel mean current (pA)
    pub mean: f64,
    /// Open channel standard deviation (pA)
    pub sd: f64,
    /// Open channel slope (pA/s)
    pub slope: f64,
}

/// Current open channel statistics as seen by the detector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BaselineState {
    pub mean: f64,
    pub sd: f64,
    pub slope: f64,
    pub drift_check_enabled: bool,
}

impl BaselineState {
    pub fn new(mean: f64, sd: f64, slope: f64) -> Self {
        Self {
            mean,
            sd,
            slope,
            drift_check_enabled: false,
        }
    }

    pub fn with_drift_check(mut self, enabled: bool) -> Self {
        self.drift_check_enabled = enabled;
        self
    }

    /// Magnitude below which a sample opens an event.
    ///
    /// `|mean| - sigma * |sd|`. May be zero or negative for wide SDs, in
    /// which case nothing can trigger.
    pub fn threshold(&self, sigma: f64) -> f64 {
        self.mean.abs() - sigma * self.sd.abs()
    }

    /// Baseline magnitude, used when no look-behind is available.
    pub fn magnitude(&self) -> f64 {
        self.mean.abs()
    }

    pub fn snapshot(&self) -> BaselineSnapshot {
        BaselineSnapshot {
            mean: self.mean,
            sd: self.sd,
            slope: self.slope,
        }
    }
}

/// Mean, population SD and least-squares slope (per second) of a block.
///
/// Returns `None` for blocks shorter than two samples.
pub fn block_statistics(block: &[f64], sample_rate_hz: f64) -> Option<BaselineSnapshot> {
    if block.len() < 2 {
        return None;
    }

    let mean = block.iter().mean();
    let sd = block.iter().population_std_dev();

    let dt = if sample_rate_hz > 0.0 {
        1.0 / sample_rate_hz
    } else {
        1.0
    };
    let times: Vec<f64> = (0..block.len()).map(|i| i as f64 * dt).collect();
    let time_variance = times.iter().variance();
    let slope = if time_variance > 0.0 {
        times.iter().covariance(block.iter()) / time_variance
    } else {
        0.0
    };

    Some(BaselineSnapshot { mean, sd, slope })
}

/// Drift seen across the blocks of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DriftStats {
    /// Blocks measured
    pub blocks: u64,
    /// Largest deviation of a block mean from the reference (SD units)
    pub max_drift_sd: f64,
    /// Smallest block slope (pA/s)
    pub min_slope: Option<f64>,
    /// Largest block slope (pA/s)
    pub max_slope: Option<f64>,
}

/// Reasons a block fails the drift check.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DriftError {
    #[error("Open channel mean drifted by {deviation_sd:.2} SD (limit {limit} SD)")]
    Mean { deviation_sd: f64, limit: f64 },

    #[error("Open channel slope {slope:.2} pA/s exceeds {limit} pA/s")]
    Rate { slope: f64, limit: f64 },
}

/// Recomputes the baseline for every full window and enforces drift limits.
///
/// Samples are collected until `block_window_secs * fs` of them are
/// available, however the source chunks its output. Only full windows are
/// measured.
#[derive(Debug, Clone)]
pub struct BaselineTracker {
    mean_override: Option<f64>,
    sd_override: Option<f64>,
    slope_override: Option<f64>,
    fixed: bool,
    drift: DriftLimits,
    sample_rate_hz: f64,
    window_len: usize,
    pending: Vec<f64>,
    reference: Option<BaselineSnapshot>,
    current: Option<BaselineState>,
    stats: DriftStats,
}

impl BaselineTracker {
    pub fn new(config: &SegmentConfig, sample_rate_hz: f64) -> Self {
        let window_len = config.block_size(sample_rate_hz);
        let mut tracker = Self {
            mean_override: config.mean_open_current,
            sd_override: config.sd_open_current,
            slope_override: config.slope_open_current,
            fixed: config.baseline_fixed(),
            drift: config.drift,
            sample_rate_hz,
            window_len,
            pending: Vec::with_capacity(window_len),
            reference: None,
            current: None,
            stats: DriftStats::default(),
        };

        if tracker.fixed {
            let state = tracker.apply_overrides(BaselineSnapshot {
                mean: 0.0,
                sd: 0.0,
                slope: 0.0,
            });
            tracker.reference = Some(state.snapshot());
            tracker.current = Some(state);
        }

        tracker
    }

    /// Baseline in effect, `None` until the first window is measured in
    /// automatic mode.
    pub fn current(&self) -> Option<BaselineState> {
        self.current
    }

    pub fn drift_stats(&self) -> DriftStats {
        self.stats
    }

    /// Samples per measured window.
    pub fn window_len(&self) -> usize {
        self.window_len
    }

    /// Samples collected towards the next window.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Collect freshly pulled samples and measure every window they complete.
    ///
    /// Returns the baseline from the last completed window, or `Ok(None)`
    /// when no window completed or the baseline is fixed by configuration.
    /// Fails when drift checking is enabled and a window strays too far
    /// from the reference.
    pub fn update(&mut self, samples: &[f64]) -> Result<Option<BaselineState>, DriftError> {
        let mut latest = None;
        let mut rest = samples;

        while !rest.is_empty() {
            let take = (self.window_len - self.pending.len()).min(rest.len());
            self.pending.extend_from_slice(&rest[..take]);
            rest = &rest[take..];

            if self.pending.len() == self.window_len {
                let window = std::mem::take(&mut self.pending);
                let measured = self.measure(&window, true);
                self.pending = window;
                self.pending.clear();
                if let Some(state) = measured? {
                    latest = Some(state);
                }
            }
        }

        Ok(latest.filter(|_| !self.fixed))
    }

    /// Handle the partial window left at end of stream.
    ///
    /// The remainder is dropped once a baseline exists. A stream shorter
    /// than one window is measured as is, without a drift check, so that it
    /// still gets a baseline.
    pub fn finish(&mut self) -> Option<BaselineState> {
        let remainder = std::mem::take(&mut self.pending);
        if self.current.is_some() {
            return None;
        }
        self.measure(&remainder, false).ok().flatten()
    }

    fn measure(
        &mut self,
        window: &[f64],
        check_drift: bool,
    ) -> Result<Option<BaselineState>, DriftError> {
        let Some(measured) = block_statistics(window, self.sample_rate_hz) else {
            return Ok(None);
        };
        let state = self.apply_overrides(measured);
        let reference = *self.reference.get_or_insert(state.snapshot());

        self.stats.blocks += 1;
        self.stats.min_slope = Some(
            self.stats
                .min_slope
                .map_or(measured.slope, |s| s.min(measured.slope)),
        );
        self.stats.max_slope = Some(
            self.stats
                .max_slope
                .map_or(measured.slope, |s| s.max(measured.slope)),
        );
        let deviation_sd = if reference.sd.abs() > 0.0 {
            (measured.mean.abs() - reference.mean.abs()).abs() / reference.sd.abs()
        } else {
            0.0
        };
        self.stats.max_drift_sd = self.stats.max_drift_sd.max(deviation_sd);

        if check_drift && state.drift_check_enabled {
            if let (Some(limit), Some(rate_limit)) =
                (self.drift.drift_threshold, self.drift.max_drift_rate)
            {
                if deviation_sd > limit {
                    return Err(DriftError::Mean {
                        deviation_sd,
                        limit,
                    });
                }
                if measured.slope.abs() > rate_limit {
                    return Err(DriftError::Rate {
                        slope: measured.slope,
                        limit: rate_limit,
                    });
                }
            }
        }

        self.current = Some(state);
        Ok(Some(state))
    }

    fn apply_overrides(&self, measured: BaselineSnapshot) -> BaselineState {
        BaselineState::new(
            self.mean_override.unwrap_or(measured.mean),
            self.sd_override.unwrap_or(measured.sd),
            self.slope_override.unwrap_or(measured.slope),
        )
        .with_drift_check(self.drift.enabled())
    }
}

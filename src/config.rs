//! Configuration for the event segmenter.
//!
//! Settings arrive either as a JSON document ([`Config::load_from`]) or as a
//! loose string-keyed settings map ([`SegmentConfig::from_settings`]). Both
//! paths resolve defaults once and reject malformed values before a run
//! starts, so nothing is parsed inside the per-sample loop.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Free-form settings forwarded to the downstream event processor.
pub type AlgorithmSettings = serde_json::Map<String, serde_json::Value>;

/// Value that disables a baseline override in string settings.
pub const AUTO_SENTINEL: f64 = -1.0;

/// Main configuration for a segmentation run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Event partitioning parameters
    pub segment: SegmentConfig,

    /// Dispatch boundary parameters
    pub dispatch: DispatchConfig,

    /// Settings snapshot handed to every dispatched event
    pub processing: AlgorithmSettings,
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load and validate configuration from an explicit path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        let config: Config =
            serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    /// Save configuration to an explicit path.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Io(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::Serialize(e.to_string()))?;

        std::fs::write(path, content).map_err(|e| ConfigError::Io(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pore-segmenter")
            .join("config.json")
    }

    /// Check every section for values that cannot drive a run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.segment.validate()?;
        self.dispatch.validate()
    }
}

/// What to do with an event still being assembled when the source runs dry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndOfStreamPolicy {
    /// Drop the unfinished event.
    #[default]
    Discard,
    /// Assemble whatever was collected and apply the usual acceptance rule.
    Flush,
}

impl std::str::FromStr for EndOfStreamPolicy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "discard" => Ok(Self::Discard),
            "flush" => Ok(Self::Flush),
            _ => Err(()),
        }
    }
}

/// Limits used by the baseline tracker to stop a run on excessive drift.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriftLimits {
    /// Allowed deviation of the block mean from the reference, in SD units
    pub drift_threshold: Option<f64>,
    /// Allowed absolute open channel slope (pA/s)
    pub max_drift_rate: Option<f64>,
}

impl Default for DriftLimits {
    fn default() -> Self {
        Self {
            drift_threshold: Some(2.0),
            max_drift_rate: Some(2.0),
        }
    }
}

impl DriftLimits {
    /// Limits with drift checking turned off.
    pub fn disabled() -> Self {
        Self {
            drift_threshold: None,
            max_drift_rate: None,
        }
    }

    /// Drift checks only run when both limits are set and non-negative.
    pub fn enabled(&self) -> bool {
        matches!(
            (self.drift_threshold, self.max_drift_rate),
            (Some(t), Some(r)) if t >= 0.0 && r >= 0.0
        )
    }
}

/// Parameters of the event partitioning algorithm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentConfig {
    /// Samples kept before and after each event
    pub pad_length: usize,
    /// Minimum in-event samples for an event to be accepted
    pub min_event_length: usize,
    /// Trigger threshold in baseline SD units
    pub threshold_sigma: f64,
    /// Window used for block baseline estimation (seconds)
    pub block_window_secs: f64,
    /// Explicit open channel mean (pA); `None` estimates it
    #[serde(with = "sentinel_serde")]
    pub mean_open_current: Option<f64>,
    /// Explicit open channel SD (pA); `None` estimates it
    #[serde(with = "sentinel_serde")]
    pub sd_open_current: Option<f64>,
    /// Explicit open channel slope (pA/s); `None` estimates it
    #[serde(with = "sentinel_serde")]
    pub slope_open_current: Option<f64>,
    /// Drift limits applied by the baseline tracker
    pub drift: DriftLimits,
    /// Whether raw event time series should be retained downstream
    pub write_event_ts: bool,
    /// Handling of an unfinished event at end of stream
    pub end_of_stream: EndOfStreamPolicy,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            pad_length: 500,
            min_event_length: 5,
            threshold_sigma: 6.0,
            block_window_secs: 1.0,
            mean_open_current: None,
            sd_open_current: None,
            slope_open_current: None,
            drift: DriftLimits::default(),
            write_event_ts: true,
            end_of_stream: EndOfStreamPolicy::Discard,
        }
    }
}

impl SegmentConfig {
    /// Build a configuration from a string-keyed settings map.
    ///
    /// Keys missing from the map keep their defaults. Unknown keys are
    /// ignored so that a shared settings file can carry other sections.
    pub fn from_settings(settings: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        // Apply in a stable order so aliases resolve deterministically.
        let mut keys: Vec<&String> = settings.keys().collect();
        keys.sort();
        for key in keys {
            config.apply_setting(key, &settings[key])?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Apply one `key=value` setting.
    pub fn apply_setting(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        match key {
            "eventPad" | "padLength" => self.pad_length = parse_value(key, value)?,
            "minEventLength" => self.min_event_length = parse_value(key, value)?,
            "eventThreshold" | "thresholdSigma" => {
                self.threshold_sigma = parse_value(key, value)?
            }
            "blockSizeSec" | "blockWindowSeconds" => {
                self.block_window_secs = parse_value(key, value)?
            }
            "meanOpenCurr" => self.mean_open_current = parse_override(key, value)?,
            "sdOpenCurr" => self.sd_open_current = parse_override(key, value)?,
            "slopeOpenCurr" => self.slope_open_current = parse_override(key, value)?,
            "driftThreshold" => self.drift.drift_threshold = parse_limit(key, value)?,
            "maxDriftRate" => self.drift.max_drift_rate = parse_limit(key, value)?,
            "writeEventTS" => self.write_event_ts = parse_flag(key, value)?,
            "endOfStream" => {
                self.end_of_stream = value.parse().map_err(|_| settings_type(key, value))?
            }
            other => tracing::debug!("Ignoring unrecognized setting '{other}'"),
        }
        Ok(())
    }

    /// Reject values that would make the run meaningless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.threshold_sigma.is_finite() || self.threshold_sigma < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "threshold_sigma must be a non-negative number, got {}",
                self.threshold_sigma
            )));
        }
        if !self.block_window_secs.is_finite() || self.block_window_secs <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "block_window_secs must be positive, got {}",
                self.block_window_secs
            )));
        }
        for (name, value) in [
            ("mean_open_current", self.mean_open_current),
            ("sd_open_current", self.sd_open_current),
            ("slope_open_current", self.slope_open_current),
        ] {
            if matches!(value, Some(v) if !v.is_finite()) {
                return Err(ConfigError::Invalid(format!("{name} must be finite")));
            }
        }
        Ok(())
    }

    /// True when all three open channel statistics are fixed by configuration.
    pub fn baseline_fixed(&self) -> bool {
        self.mean_open_current.is_some()
            && self.sd_open_current.is_some()
            && self.slope_open_current.is_some()
    }

    /// Number of samples in one baseline block at the given sampling rate.
    pub fn block_size(&self, sample_rate_hz: f64) -> usize {
        let size = (self.block_window_secs * sample_rate_hz).round();
        if size.is_finite() && size >= 1.0 {
            size as usize
        } else {
            1
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let mut out = format!(
            "Event segment settings:\n\
             - Window size for block operations = {} s\n\
             - Event padding = {} points\n\
             - Min. event rejection length = {} points\n\
             - Event trigger threshold = {:5.2} * SD\n",
            self.block_window_secs, self.pad_length, self.min_event_length, self.threshold_sigma
        );
        match (self.drift.enabled(), self.drift.drift_threshold, self.drift.max_drift_rate) {
            (true, Some(threshold), Some(rate)) => {
                out.push_str(&format!("- Drift error threshold = {threshold} * SD\n"));
                out.push_str(&format!("- Drift rate error threshold = {rate} pA/s\n"));
            }
            _ => {
                out.push_str("- Drift error threshold = ***disabled***\n");
                out.push_str("- Drift rate error threshold = ***disabled***\n");
            }
        }
        out.push_str(if self.write_event_ts {
            "- Event time-series = ***enabled***"
        } else {
            "- Event time-series = ***disabled***"
        });
        out
    }
}

/// Configuration for the dispatch boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Number of worker threads processing events
    pub workers: usize,
    /// Events that may wait in the queue before dispatch blocks
    pub queue_capacity: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            queue_capacity: 1024,
        }
    }
}

impl DispatchConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::Invalid("dispatch.workers must be at least 1".into()));
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "dispatch.queue_capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Serialize error: {0}")]
    Serialize(String),

    #[error("Setting '{key}' has a value of the wrong type: '{value}'")]
    SettingsType { key: String, value: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

fn settings_type(key: &str, value: &str) -> ConfigError {
    ConfigError::SettingsType {
        key: key.to_string(),
        value: value.to_string(),
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| settings_type(key, value))
}

fn parse_override(key: &str, value: &str) -> Result<Option<f64>, ConfigError> {
    let v: f64 = parse_value(key, value)?;
    Ok(if v == AUTO_SENTINEL { None } else { Some(v) })
}

fn parse_limit(key: &str, value: &str) -> Result<Option<f64>, ConfigError> {
    let v: f64 = parse_value(key, value)?;
    Ok(if v < 0.0 { None } else { Some(v) })
}

fn parse_flag(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(settings_type(key, value)),
    }
}

/// Serde support for overrides: `-1` (or null) on disk means "estimate".
mod sentinel_serde {
    use super::AUTO_SENTINEL;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(value: &Option<f64>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value.unwrap_or(AUTO_SENTINEL).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<f64>::deserialize(deserializer)?;
        Ok(value.filter(|v| *v != AUTO_SENTINEL))
    }
}

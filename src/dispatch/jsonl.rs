//! JSON Lines event writer.
//!
//! A minimal downstream processor: one JSON object per event with its
//! position, duration and mean blockade current. Raw samples are included
//! only when the event asks for its time series to be kept.

use super::{EventProcessor, ProcessError};
use crate::core::{BaselineSnapshot, EventRecord};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::sync::Mutex;
use uuid::Uuid;

/// Per-event metadata written by [`JsonLinesWriter`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventSummary {
    pub id: Uuid,
    pub sequence: u64,
    pub absolute_start_index: i64,
    pub start_offset: usize,
    pub end_offset: usize,
    pub run_length: usize,
    pub duration_secs: f64,
    /// Mean current over the in-event samples (pA)
    pub mean_event_current: f64,
    /// Mean event current relative to the open channel mean
    pub blockade_ratio: Option<f64>,
    pub baseline: BaselineSnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub samples: Option<Vec<f64>>,
}

impl EventSummary {
    pub fn from_record(event: &EventRecord) -> Self {
        let run = event.event_samples();
        let mean_event_current = if run.is_empty() {
            0.0
        } else {
            run.iter().sum::<f64>() / run.len() as f64
        };
        let blockade_ratio = if event.baseline.mean != 0.0 {
            Some(mean_event_current.abs() / event.baseline.mean.abs())
        } else {
            None
        };

        Self {
            id: event.id,
            sequence: event.sequence,
            absolute_start_index: event.absolute_start_index,
            start_offset: event.start_offset,
            end_offset: event.end_offset,
            run_length: event.run_length(),
            duration_secs: event.duration_secs(),
            mean_event_current,
            blockade_ratio,
            baseline: event.baseline,
            samples: event.persist_raw_series.then(|| event.samples.clone()),
        }
    }
}

/// Writes an [`EventSummary`] line per event to any writer.
pub struct JsonLinesWriter {
    writer: Mutex<Box<dyn Write + Send>>,
}

impl JsonLinesWriter {
    pub fn new(writer: impl Write + Send + 'static) -> Self {
        Self {
            writer: Mutex::new(Box::new(writer)),
        }
    }

    /// Flush buffered output.
    pub fn flush(&self) -> Result<(), ProcessError> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| ProcessError::Failed("writer lock poisoned".into()))?;
        writer.flush()?;
        Ok(())
    }
}

impl EventProcessor for JsonLinesWriter {
    fn process(&self, event: EventRecord) -> Result<(), ProcessError> {
        let line = serde_json::to_string(&EventSummary::from_record(&event))?;
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| ProcessError::Failed("writer lock poisoned".into()))?;
        writeln!(writer, "{line}")?;
        Ok(())
    }
}

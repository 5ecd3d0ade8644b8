//! Plain-text sample source.
//!
//! Reads one sample per line. Only the first field of a line is used, with
//! commas and whitespace both accepted as separators, so single-column CSV
//! exports and `time value` dumps work alike. Blank lines and lines
//! starting with `#` are skipped.

use super::{SampleSource, SourceError};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Source reading newline-separated current values.
pub struct TextSource<R> {
    reader: R,
    sample_rate_hz: f64,
    line_number: usize,
    line: String,
}

impl TextSource<BufReader<File>> {
    /// Open a text file as a sample source.
    pub fn open(path: &Path, sample_rate_hz: f64) -> Result<Self, SourceError> {
        let file = File::open(path)?;
        Ok(Self::new(BufReader::new(file), sample_rate_hz))
    }
}

impl<R: BufRead> TextSource<R> {
    pub fn new(reader: R, sample_rate_hz: f64) -> Self {
        Self {
            reader,
            sample_rate_hz,
            line_number: 0,
            line: String::new(),
        }
    }

    fn next_value(&mut self) -> Result<Option<f64>, SourceError> {
        loop {
            self.line.clear();
            if self.reader.read_line(&mut self.line)? == 0 {
                return Ok(None);
            }
            self.line_number += 1;

            let trimmed = self.line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let field = trimmed
                .split(|c: char| c == ',' || c.is_whitespace())
                .next()
                .unwrap_or(trimmed);
            return field
                .parse::<f64>()
                .map(Some)
                .map_err(|_| SourceError::Malformed {
                    line: self.line_number,
                    value: field.to_string(),
                });
        }
    }
}

impl<R: BufRead> SampleSource for TextSource<R> {
    fn sample_rate_hz(&self) -> f64 {
        self.sample_rate_hz
    }

    fn pull(&mut self, n: usize) -> Result<Vec<f64>, SourceError> {
        let mut chunk = Vec::with_capacity(n.clamp(1, 65_536));
        while chunk.len() < n.max(1) {
            match self.next_value()? {
                Some(value) => chunk.push(value),
                None => break,
            }
        }
        if chunk.is_empty() {
            Err(SourceError::EndOfStream)
        } else {
            Ok(chunk)
        }
    }
}

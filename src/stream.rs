//! Motion sample stream parsing and validation
//!
//! Hosts and the CLI exchange recorded sample streams as JSON: either one
//! array of samples, or newline-delimited JSON with one sample per line.
//! Validation covers the assumptions the engine itself does not recheck
//! per sample: finite acceleration values and non-decreasing timestamps.

use crate::error::TrackerError;
use crate::types::MotionSample;

/// Parser for motion sample streams.
pub struct SampleStream;

impl SampleStream {
    /// Parse a JSON array of samples.
    pub fn parse_array(json: &str) -> Result<Vec<MotionSample>, TrackerError> {
        let samples: Vec<MotionSample> = serde_json::from_str(json)?;
        Ok(samples)
    }

    /// Parse NDJSON (newline-delimited JSON), one sample per line.
    ///
    /// Blank lines are skipped; the first malformed line aborts with its
    /// line number.
    pub fn parse_ndjson(ndjson: &str) -> Result<Vec<MotionSample>, TrackerError> {
        let mut samples = Vec::new();
        for (line_num, line) in ndjson.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<MotionSample>(trimmed) {
                Ok(sample) => samples.push(sample),
                Err(e) => {
                    return Err(TrackerError::ParseError(format!(
                        "Failed to parse line {}: {}",
                        line_num + 1,
                        e
                    )));
                }
            }
        }
        Ok(samples)
    }

    /// Check a parsed stream for problems the engine assumes away.
    pub fn validate(samples: &[MotionSample]) -> Vec<SampleIssue> {
        let mut issues = Vec::new();
        let mut previous: Option<&MotionSample> = None;
        for (index, sample) in samples.iter().enumerate() {
            if !(sample.x.is_finite() && sample.y.is_finite() && sample.z.is_finite()) {
                issues.push(SampleIssue {
                    index,
                    kind: IssueKind::NonFinite,
                });
            }
            if let Some(prev) = previous {
                if sample.timestamp < prev.timestamp {
                    issues.push(SampleIssue {
                        index,
                        kind: IssueKind::OutOfOrder,
                    });
                }
            }
            previous = Some(sample);
        }
        issues
    }
}

/// A problem found at one position in a sample stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleIssue {
    pub index: usize,
    pub kind: IssueKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueKind {
    /// An acceleration component is NaN or infinite
    NonFinite,
    /// Timestamp earlier than the preceding sample's
    OutOfOrder,
}

impl IssueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueKind::NonFinite => "non-finite acceleration value",
            IssueKind::OutOfOrder => "timestamp earlier than previous sample",
        }
    }
}

//! Step-period predicate
//!
//! Decides on which simulation steps the visualization session is notified.
//! The syntax is a comma separated list of segments, each either
//!
//! - `every`: every `every`-th step starting at step 0, or
//! - `start:end[:every]`: every `every`-th step (default 1) in the inclusive
//!   range `start..=end`; an empty `start` means 0, an empty `end` means
//!   unbounded.
//!
//! An empty string disables notification entirely.

use crate::error::{Result, VisError};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// One `start:end:every` segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PeriodSegment {
    start: u32,
    end: Option<u32>,
    every: u32,
}

impl PeriodSegment {
    fn includes(&self, step: u32) -> bool {
        if step < self.start {
            return false;
        }
        if let Some(end) = self.end {
            if step > end {
                return false;
            }
        }
        (step - self.start) % self.every == 0
    }
}

/// Parsed step-period predicate
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StepPeriod {
    segments: Vec<PeriodSegment>,
    source: String,
}

impl StepPeriod {
    /// A predicate matching every step
    pub fn every_step() -> Self {
        Self::every(1)
    }

    /// A predicate matching every `n`-th step, starting at step 0
    pub fn every(n: u32) -> Self {
        let n = n.max(1);
        Self {
            segments: vec![PeriodSegment {
                start: 0,
                end: None,
                every: n,
            }],
            source: n.to_string(),
        }
    }

    /// A predicate that never matches
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Whether no step can ever match
    pub fn is_disabled(&self) -> bool {
        self.segments.is_empty()
    }

    /// Whether `step` is selected by any segment
    pub fn includes(&self, step: u32) -> bool {
        self.segments.iter().any(|s| s.includes(step))
    }

    fn parse_bound(text: &str, what: &str, full: &str) -> Result<Option<u32>> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }
        text.parse::<u32>().map(Some).map_err(|e| {
            VisError::Config(format!("Invalid {} '{}' in period '{}': {}", what, text, full, e))
        })
    }
}

impl FromStr for StepPeriod {
    type Err = VisError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Ok(Self::disabled());
        }

        let mut segments = Vec::new();
        for part in trimmed.split(',') {
            let fields: Vec<&str> = part.split(':').collect();
            let segment = match fields.as_slice() {
                [every] => PeriodSegment {
                    start: 0,
                    end: None,
                    every: Self::parse_bound(every, "period", s)?.unwrap_or(0),
                },
                [start, end] => PeriodSegment {
                    start: Self::parse_bound(start, "start", s)?.unwrap_or(0),
                    end: Self::parse_bound(end, "end", s)?,
                    every: 1,
                },
                [start, end, every] => PeriodSegment {
                    start: Self::parse_bound(start, "start", s)?.unwrap_or(0),
                    end: Self::parse_bound(end, "end", s)?,
                    every: Self::parse_bound(every, "period", s)?.unwrap_or(1),
                },
                _ => {
                    return Err(VisError::Config(format!(
                        "Malformed period segment '{}' in '{}'",
                        part, s
                    )))
                }
            };

            if segment.every == 0 {
                return Err(VisError::Config(format!(
                    "Period must be at least 1 in '{}'",
                    s
                )));
            }
            if matches!(segment.end, Some(end) if end < segment.start) {
                return Err(VisError::Config(format!(
                    "Period segment '{}' ends before it starts",
                    part
                )));
            }
            segments.push(segment);
        }

        Ok(Self {
            segments,
            source: trimmed.to_string(),
        })
    }
}

impl fmt::Display for StepPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl Serialize for StepPeriod {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.source)
    }
}

impl<'de> Deserialize<'de> for StepPeriod {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

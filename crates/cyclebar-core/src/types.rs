//! Type definitions for cycle-bar processing

use crate::errors::PipelineError;
use chrono::{Datelike, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// OHLCV bar for one fixed period
///
/// Base bars are 1-minute; derived bars come out of [`crate::resample::Resampler`].
/// Timestamps label the END of the covered period (right-labelled).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// Period end, minute-aligned
    pub timestamp: NaiveDateTime,

    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,

    /// Traded volume
    pub volume: u64,

    /// Turnover (money traded)
    pub money: u64,
}

impl Bar {
    /// Price extreme a cycle of `direction` is measured against
    ///
    /// Upturn cycles run to the highest high, downturn cycles to the lowest low.
    #[inline]
    pub fn extreme(&self, direction: Direction) -> f64 {
        match direction {
            Direction::Upturn => self.high,
            Direction::Downturn => self.low,
        }
    }
}

/// Resampling period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Period {
    /// N-minute bars
    Minutes(u32),
    /// One bar per calendar date
    Daily,
}

impl Period {
    /// Text label used as storage scope (`15m`, `day`)
    pub fn label(&self) -> String {
        match self {
            Period::Minutes(n) => format!("{n}m"),
            Period::Daily => "day".to_string(),
        }
    }

    /// Whether buckets are anchored at each session block open instead of midnight
    pub fn splits_session(&self) -> bool {
        matches!(self, Period::Minutes(60) | Period::Minutes(120))
    }

    /// Period length in minutes (`None` for daily)
    pub fn minutes(&self) -> Option<u32> {
        match self {
            Period::Minutes(n) => Some(*n),
            Period::Daily => None,
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

impl FromStr for Period {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        match trimmed {
            "day" | "daily" | "d" | "D" => return Ok(Period::Daily),
            _ => {}
        }

        let digits = trimmed
            .strip_suffix("min")
            .or_else(|| trimmed.strip_suffix('m'))
            .ok_or_else(|| PipelineError::UnsupportedPeriod(s.to_string()))?;

        match digits.parse::<u32>() {
            Ok(n) if n > 0 && n <= 24 * 60 => Ok(Period::Minutes(n)),
            _ => Err(PipelineError::UnsupportedPeriod(s.to_string())),
        }
    }
}

impl TryFrom<String> for Period {
    type Error = PipelineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Period> for String {
    fn from(value: Period) -> Self {
        value.label()
    }
}

/// Swing direction of a signal or cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Upturn,
    Downturn,
}

impl Direction {
    /// +1.0 for upturns, -1.0 for downturns
    #[inline]
    pub fn sign(self) -> f64 {
        match self {
            Direction::Upturn => 1.0,
            Direction::Downturn => -1.0,
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Direction::Upturn => Direction::Downturn,
            Direction::Downturn => Direction::Upturn,
        }
    }
}

/// Explicit cycle identity
///
/// Encoded as `YYYYMMDDHHMM` of the cycle's first bar, so ids increase with time
/// and stay stable when the same cycle is re-derived in a later run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CycleId(pub i64);

impl CycleId {
    pub fn from_start(start: NaiveDateTime) -> Self {
        let date = start.date();
        let time = start.time();
        CycleId(
            i64::from(date.year()) * 100_000_000
                + i64::from(date.month()) * 1_000_000
                + i64::from(date.day()) * 10_000
                + i64::from(time.hour()) * 100
                + i64::from(time.minute()),
        )
    }
}

impl fmt::Display for CycleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Round half away from zero to `decimals` places
#[inline]
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

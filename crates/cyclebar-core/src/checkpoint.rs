//! Checkpoint record for incremental continuation
//!
//! Written last in every committed run. The next run reads it to decide how much
//! base history to reload.
//!
//! ```text
//! run N   → commit derived bars, bounds, matrices → write Checkpoint
//! run N+1 → read Checkpoint → load bars since next_start - warmup → ...
//! ```
//!
//! ## Key Invariants
//!
//! - `next_start_date <= end_date`
//! - `end_signal_start_time <= end_date`
//! - emission watermarks only move forward

use crate::types::{CycleId, Direction};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Persisted per-series progress
///
/// Field names on disk follow the established record layout
/// (`RecordEndDate`, `RecordEndSignal`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Timestamp of the last settled derived bar
    #[serde(rename = "RecordEndDate")]
    pub end_date: NaiveDateTime,

    /// Direction of the last settled cycle
    #[serde(rename = "RecordEndSignal")]
    pub end_signal: Direction,

    /// Cycle id of the last settled cycle
    #[serde(rename = "RecordEndSignalTimes")]
    pub end_signal_cycle: CycleId,

    /// Start time of the last settled cycle
    #[serde(rename = "RecordEndSignalStartTime")]
    pub end_signal_start_time: NaiveDateTime,

    /// Start of the Nth-from-last settled cycle; lower bound for the next run's window
    #[serde(rename = "RecordNextStartDate")]
    pub next_start_date: NaiveDateTime,

    /// Newest base bar seen by the run; records without it fall back to `end_date`
    #[serde(rename = "RecordBaseEndDate", default)]
    pub base_end_date: Option<NaiveDateTime>,

    /// Last cycle emitted into each model's matrix store
    #[serde(default)]
    pub emitted: BTreeMap<String, CycleId>,

    /// Anomaly counts accumulated over all runs
    #[serde(default)]
    pub anomaly_summary: AnomalySummary,
}

impl Checkpoint {
    /// Check record consistency
    pub fn validate(&self) -> Result<(), CheckpointError> {
        if self.next_start_date > self.end_date {
            return Err(CheckpointError::InconsistentWindow {
                next_start: self.next_start_date,
                end: self.end_date,
            });
        }
        if self.end_signal_start_time > self.end_date {
            return Err(CheckpointError::SignalAfterEnd {
                signal_start: self.end_signal_start_time,
                end: self.end_date,
            });
        }
        Ok(())
    }

    /// Newest base bar already processed
    pub fn processed_until(&self) -> NaiveDateTime {
        self.base_end_date.unwrap_or(self.end_date)
    }

    /// Emission watermark for a model
    pub fn emitted_for(&self, model: &str) -> Option<CycleId> {
        self.emitted.get(model).copied()
    }

    /// Advance a model's watermark; never moves it backwards
    pub fn record_emitted(&mut self, model: &str, last: CycleId) {
        let slot = self.emitted.entry(model.to_string()).or_insert(last);
        if last > *slot {
            *slot = last;
        }
    }
}

/// Anomaly summary for debugging and monitoring
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnomalySummary {
    /// Number of intra-block timestamp gaps in the base bars
    pub gaps_detected: u32,

    /// Number of duplicate timestamps dropped
    pub overlaps_detected: u32,

    /// Number of rows dropped because their prices could not be filled
    pub unfillable_rows: u32,
}

impl AnomalySummary {
    pub fn record_gap(&mut self) {
        self.gaps_detected += 1;
    }

    pub fn record_overlap(&mut self) {
        self.overlaps_detected += 1;
    }

    pub fn record_unfillable(&mut self) {
        self.unfillable_rows += 1;
    }

    /// Check if any anomalies were detected
    pub fn has_anomalies(&self) -> bool {
        self.total() > 0
    }

    /// Get total anomaly count
    pub fn total(&self) -> u32 {
        self.gaps_detected + self.overlaps_detected + self.unfillable_rows
    }

    /// Add another run's counts
    pub fn absorb(&mut self, other: &AnomalySummary) {
        self.gaps_detected += other.gaps_detected;
        self.overlaps_detected += other.overlaps_detected;
        self.unfillable_rows += other.unfillable_rows;
    }
}

/// Checkpoint-related errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CheckpointError {
    /// Next-start lies after the recorded end
    #[error("Checkpoint next start {next_start} is after end {end}")]
    InconsistentWindow {
        next_start: NaiveDateTime,
        end: NaiveDateTime,
    },

    /// Last signal starts after the recorded end
    #[error("Checkpoint signal start {signal_start} is after end {end}")]
    SignalAfterEnd {
        signal_start: NaiveDateTime,
        end: NaiveDateTime,
    },
}

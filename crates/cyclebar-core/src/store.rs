//! Collaborator interfaces consumed by the orchestrator
//!
//! Storage topology (files, tables, year partitions) stays behind these traits.
//! Every call is keyed by [`SeriesKey`]; no state is shared across series.

use crate::checkpoint::Checkpoint;
use crate::cycle::CycleBar;
use crate::ingest::RawBar;
use crate::matrix::FeatureMatrix;
use crate::normalize::StoredBounds;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// One processed series: a symbol at a target period
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SeriesKey {
    pub symbol: String,
    /// Target period label (`15m`, `60m`, `day`)
    pub scope: String,
}

impl SeriesKey {
    pub fn new(symbol: impl Into<String>, scope: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            scope: scope.into(),
        }
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.symbol, self.scope)
    }
}

/// Storage failures
#[derive(Error, Debug)]
pub enum StoreError {
    /// Append hit a timestamp that already exists
    #[error("Duplicate key {timestamp} in {key}")]
    DuplicateKey {
        key: String,
        timestamp: NaiveDateTime,
    },

    /// Stored bars lack a required column
    #[error("Missing required column '{column}' in {path}")]
    MissingColumn { column: String, path: String },

    /// Stored record cannot be decoded
    #[error("Corrupt record at {path}: {reason}")]
    Corrupt { path: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other backend failure
    #[error("Store backend error: {reason}")]
    Backend { reason: String },
}

/// Source of raw base-resolution bars
pub trait BarSource {
    /// Bars with `timestamp >= since` (all bars for `None`), any order
    fn load_base_bars(
        &self,
        symbol: &str,
        since: Option<NaiveDateTime>,
    ) -> Result<Vec<RawBar>, StoreError>;
}

/// Derived (cycle-annotated) bar history per series
pub trait DerivedBarStore {
    /// Append; fails with [`StoreError::DuplicateKey`] when any timestamp exists
    fn append_derived_bars(&mut self, key: &SeriesKey, bars: &[CycleBar])
        -> Result<(), StoreError>;

    /// Overwrite the whole stored series
    fn replace_derived_bars(
        &mut self,
        key: &SeriesKey,
        bars: &[CycleBar],
    ) -> Result<(), StoreError>;

    /// Whole stored series, ordered by time
    fn load_derived_bars(&self, key: &SeriesKey) -> Result<Vec<CycleBar>, StoreError>;
}

pub trait CheckpointStore {
    fn read_checkpoint(&self, key: &SeriesKey) -> Result<Option<Checkpoint>, StoreError>;

    fn write_checkpoint(
        &mut self,
        key: &SeriesKey,
        checkpoint: &Checkpoint,
    ) -> Result<(), StoreError>;
}

/// Persisted normalization bounds per (series, column)
pub trait BoundsStore {
    fn read_normalization_bounds(
        &self,
        key: &SeriesKey,
        column: &str,
    ) -> Result<Option<StoredBounds>, StoreError>;

    fn write_normalization_bounds(
        &mut self,
        key: &SeriesKey,
        column: &str,
        bounds: &StoredBounds,
    ) -> Result<(), StoreError>;
}

/// Feature-matrix artifacts per (series, model)
pub trait MatrixStore {
    /// Concatenate `matrix` after any previously persisted one along the batch axis
    ///
    /// Slices whose cycle is not newer than the stored last cycle are skipped,
    /// so re-sending a batch after an interrupted commit does not duplicate it.
    fn persist_feature_matrix(
        &mut self,
        key: &SeriesKey,
        model: &str,
        matrix: &FeatureMatrix,
    ) -> Result<(), StoreError>;
}

/// Everything one orchestrated run needs
pub trait PipelineStore:
    BarSource + DerivedBarStore + CheckpointStore + BoundsStore + MatrixStore
{
}

impl<T> PipelineStore for T where
    T: BarSource + DerivedBarStore + CheckpointStore + BoundsStore + MatrixStore
{
}

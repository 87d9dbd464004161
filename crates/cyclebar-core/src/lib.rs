//! Core cycle-bar processing pipeline
//!
//! Turns a 1-minute OHLCV stream into directional price cycles and fixed-size,
//! normalized feature matrices.
//!
//! ## Stages
//!
//! - [`resample`]: 1-minute bars to N-minute/daily bars, session-aware
//! - [`signal`]: moving-average oscillator and validated reversal signals
//! - [`bollinger`]: rolling bands and stop-loss carried on every period bar
//! - [`cycle`]: per-cycle extremes, amplitude, length, volume peaks and links
//! - [`normalize`]: widening robust bounds and the volume baseline
//! - [`matrix`]: padded (N, height, width, 1) tensors plus label rows
//! - [`orchestrator`]: initial/incremental runs committed through [`store`] traits
//!
//! Every stage returns a new value; nothing is mutated across stages.

pub mod bollinger;
pub mod checkpoint;
pub mod cycle;
pub mod errors;
pub mod frame;
pub mod ingest;
pub mod matrix;
pub mod normalize;
pub mod orchestrator;
pub mod oscillator;
pub mod resample;
pub mod session;
pub mod signal;
pub mod store;
pub mod types;
pub mod volume;

// Test utilities (only available in test builds or with test-utils feature)
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

// Re-export commonly used types
pub use bollinger::{Bollinger, BollingerBand};
pub use checkpoint::{AnomalySummary, Checkpoint, CheckpointError};
pub use cycle::{CycleBar, CycleStatistics, CycleSummary, CycleTable, StatisticsParams};
pub use errors::PipelineError;
pub use frame::{Column, ColumnRole, FeatureFrame};
pub use ingest::{IngestReport, RawBar};
pub use matrix::{FeatureMatrix, MatrixBuilder, MatrixShape, ModelSpec};
pub use normalize::{
    BaselineMax, Normalizer, NormalizerParams, ParameterStore, Sample, ScaleBounds, ScaleRule,
    StagedBounds, StoredBounds,
};
pub use orchestrator::{Orchestrator, PipelineParams, RunMode, RunOutcome, RunReport};
pub use oscillator::{Oscillator, OscillatorParams, OscillatorPoint};
pub use resample::Resampler;
pub use signal::{CycleTag, SignalBar, SignalDetector, SignalParams, SignalSeries};
pub use store::{
    BarSource, BoundsStore, CheckpointStore, DerivedBarStore, MatrixStore, PipelineStore,
    SeriesKey, StoreError,
};
pub use types::{Bar, CycleId, Direction, Period};

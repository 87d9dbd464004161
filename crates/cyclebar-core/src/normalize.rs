//! Feature normalization with persisted, widening bounds
//!
//! ## Strategies
//!
//! - **Robust**: `median ± 3 × 1.4826 × MAD` (rounded to 2 decimals), widened
//!   against the persisted bounds, then clip-and-scale to [0, 1]
//! - **Volume baseline**: max of the 90-day rolling mean of daily volume, merged
//!   with the persisted max; `parser = max / rolling_mean` multiplies every
//!   volume-type column
//! - **Read-only**: clip-and-scale with another column's persisted bounds
//!
//! Bounds only widen. All reads and merges go through a [`ParameterStore`].

use crate::errors::PipelineError;
use crate::frame::{Column, FeatureFrame};
use crate::oscillator::RollingMean;
use crate::resample::Resampler;
use crate::store::{BoundsStore, SeriesKey};
use crate::types::{round_to, Bar, Period};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info};

/// Consistency constant turning MAD into a standard-deviation estimate
pub const MAD_SCALE: f64 = 1.4826;

const BOUNDS_DECIMALS: i32 = 2;

/// Robust scaling bounds, persisted as `{num_min, num_max}`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScaleBounds {
    #[serde(rename = "num_min")]
    pub low: f64,
    #[serde(rename = "num_max")]
    pub high: f64,
}

impl ScaleBounds {
    pub fn new(low: f64, high: f64) -> Self {
        Self { low, high }
    }

    /// Union of both intervals
    pub fn widen(&self, other: &ScaleBounds) -> ScaleBounds {
        ScaleBounds {
            low: self.low.min(other.low),
            high: self.high.max(other.high),
        }
    }

    /// Whether `other` lies within these bounds
    pub fn contains(&self, other: &ScaleBounds) -> bool {
        self.low <= other.low && self.high >= other.high
    }

    /// Fail when scaling would divide by zero
    pub fn ensure_usable(&self, column: &str) -> Result<(), PipelineError> {
        if self.high > self.low {
            Ok(())
        } else {
            Err(PipelineError::DegenerateScale {
                column: column.to_string(),
                low: self.low,
                high: self.high,
            })
        }
    }

    /// Clip to `[low, high]` and scale to `[0, 1]`
    #[inline]
    pub fn normalize(&self, value: f64) -> f64 {
        (value.clamp(self.low, self.high) - self.low) / (self.high - self.low)
    }

    /// Map a scaled value back to raw units
    #[inline]
    pub fn denormalize(&self, scaled: f64) -> f64 {
        self.low + scaled * (self.high - self.low)
    }
}

/// Historical maximum, persisted as `{num_max}`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BaselineMax {
    #[serde(rename = "num_max")]
    pub max: f64,
}

/// One persisted bounds record
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoredBounds {
    Range(ScaleBounds),
    Max(BaselineMax),
}

impl StoredBounds {
    pub fn kind(&self) -> &'static str {
        match self {
            StoredBounds::Range(_) => "{num_min, num_max}",
            StoredBounds::Max(_) => "{num_max}",
        }
    }

    /// Widen `self` by `other`; `None` when the kinds differ
    pub fn merge(&self, other: &StoredBounds) -> Option<StoredBounds> {
        match (self, other) {
            (StoredBounds::Range(a), StoredBounds::Range(b)) => {
                Some(StoredBounds::Range(a.widen(b)))
            }
            (StoredBounds::Max(a), StoredBounds::Max(b)) => Some(StoredBounds::Max(BaselineMax {
                max: a.max.max(b.max),
            })),
            _ => None,
        }
    }

    fn into_range(self, column: &str) -> Result<ScaleBounds, PipelineError> {
        match self {
            StoredBounds::Range(bounds) => Ok(bounds),
            StoredBounds::Max(_) => Err(PipelineError::BoundsKindMismatch {
                column: column.to_string(),
                expected: "{num_min, num_max}",
            }),
        }
    }

    fn into_max(self, column: &str) -> Result<BaselineMax, PipelineError> {
        match self {
            StoredBounds::Max(max) => Ok(max),
            StoredBounds::Range(_) => Err(PipelineError::BoundsKindMismatch {
                column: column.to_string(),
                expected: "{num_max}",
            }),
        }
    }
}

/// Per-column bounds for one series: read, and widen-then-write
pub trait ParameterStore {
    /// Current bounds for `column`, if any
    fn get(&self, column: &str) -> Result<Option<StoredBounds>, PipelineError>;

    /// Merge `computed` into the current bounds, store and return the result
    fn merge_and_put(
        &mut self,
        column: &str,
        computed: StoredBounds,
    ) -> Result<StoredBounds, PipelineError>;
}

fn merge_with(
    existing: Option<StoredBounds>,
    computed: StoredBounds,
    column: &str,
) -> Result<StoredBounds, PipelineError> {
    match existing {
        None => Ok(computed),
        Some(old) => old
            .merge(&computed)
            .ok_or_else(|| PipelineError::BoundsKindMismatch {
                column: column.to_string(),
                expected: old.kind(),
            }),
    }
}

impl ParameterStore for BTreeMap<String, StoredBounds> {
    fn get(&self, column: &str) -> Result<Option<StoredBounds>, PipelineError> {
        Ok(BTreeMap::get(self, column).copied())
    }

    fn merge_and_put(
        &mut self,
        column: &str,
        computed: StoredBounds,
    ) -> Result<StoredBounds, PipelineError> {
        let merged = merge_with(BTreeMap::get(self, column).copied(), computed, column)?;
        self.insert(column.to_string(), merged);
        Ok(merged)
    }
}

/// Read-through view over a [`BoundsStore`] buffering merged bounds until commit
pub struct StagedBounds<'a, S: BoundsStore + ?Sized> {
    store: &'a S,
    key: &'a SeriesKey,
    pending: BTreeMap<String, StoredBounds>,
}

impl<'a, S: BoundsStore + ?Sized> StagedBounds<'a, S> {
    pub fn new(store: &'a S, key: &'a SeriesKey) -> Self {
        Self {
            store,
            key,
            pending: BTreeMap::new(),
        }
    }

    /// Bounds to write at commit
    pub fn into_pending(self) -> BTreeMap<String, StoredBounds> {
        self.pending
    }
}

impl<S: BoundsStore + ?Sized> ParameterStore for StagedBounds<'_, S> {
    fn get(&self, column: &str) -> Result<Option<StoredBounds>, PipelineError> {
        if let Some(staged) = self.pending.get(column) {
            return Ok(Some(*staged));
        }
        Ok(self.store.read_normalization_bounds(self.key, column)?)
    }

    fn merge_and_put(
        &mut self,
        column: &str,
        computed: StoredBounds,
    ) -> Result<StoredBounds, PipelineError> {
        let merged = merge_with(self.get(column)?, computed, column)?;
        self.pending.insert(column.to_string(), merged);
        Ok(merged)
    }
}

/// Which rows feed the robust estimate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sample {
    /// Every non-null row
    All,
    /// One row per cycle (its first row)
    CycleRepresentative,
    /// Distinct values only
    Distinct,
}

/// How one column is scaled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleRule {
    /// Estimate, widen, persist, apply
    Robust { sample: Sample },
    /// Apply another column's persisted bounds without updating them
    ReadOnly { source: Column },
}

/// Normalizer settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizerParams {
    /// Rolling window of the daily-volume mean, in trading days
    pub baseline_window: usize,
    /// MAD multiplier of the robust bounds
    pub mad_multiplier: f64,
    pub plan: Vec<(Column, ScaleRule)>,
}

impl Default for NormalizerParams {
    fn default() -> Self {
        use Column::*;
        let robust = |sample| ScaleRule::Robust { sample };
        let read_only = |source| ScaleRule::ReadOnly { source };
        Self {
            baseline_window: 90,
            mad_multiplier: 3.0,
            plan: vec![
                (Volume, robust(Sample::All)),
                (BarVolPeak1, robust(Sample::All)),
                (BarVolPeak5, robust(Sample::All)),
                (Position, robust(Sample::All)),
                (AmplitudePerBar, robust(Sample::All)),
                (SessionVolPeak1, robust(Sample::Distinct)),
                (SessionVolPeak5, robust(Sample::Distinct)),
                (SessionVolPeak15, robust(Sample::Distinct)),
                (CycleVolPeak1, robust(Sample::CycleRepresentative)),
                (CycleVolPeak5, robust(Sample::CycleRepresentative)),
                (Length, robust(Sample::CycleRepresentative)),
                (NextLength, robust(Sample::CycleRepresentative)),
                (Amplitude, robust(Sample::CycleRepresentative)),
                (NextAmplitude, robust(Sample::CycleRepresentative)),
                (EndSessionVolPeak5, robust(Sample::CycleRepresentative)),
                (PrevVolPeak1, read_only(CycleVolPeak1)),
                (NextVolPeak1, read_only(CycleVolPeak1)),
                (PrevVolPeak5, read_only(CycleVolPeak5)),
                (NextVolPeak5, read_only(CycleVolPeak5)),
                (PrevLength, read_only(Length)),
                (PrevAmplitude, read_only(Amplitude)),
            ],
        }
    }
}

impl NormalizerParams {
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.baseline_window == 0 {
            return Err(PipelineError::invalid_parameter(
                "baseline_window",
                "must be at least 1",
            ));
        }
        if !(self.mad_multiplier.is_finite() && self.mad_multiplier > 0.0) {
            return Err(PipelineError::invalid_parameter(
                "mad_multiplier",
                format!("must be positive, got {}", self.mad_multiplier),
            ));
        }
        let mut seen = HashSet::new();
        for (column, _) in &self.plan {
            if !seen.insert(*column) {
                return Err(PipelineError::invalid_parameter(
                    "plan",
                    format!("column '{column}' listed twice"),
                ));
            }
        }
        Ok(())
    }
}

/// Frame normalizer
#[derive(Debug, Clone)]
pub struct Normalizer {
    params: NormalizerParams,
}

impl Normalizer {
    pub fn new(params: NormalizerParams) -> Result<Self, PipelineError> {
        params.validate()?;
        Ok(Self { params })
    }

    /// Scale every column of the plan, volume baseline first
    ///
    /// Robust columns are merged before read-only ones, so a read-only column
    /// sees its source's bounds as widened by this run.
    pub fn normalize<P: ParameterStore + ?Sized>(
        &self,
        frame: FeatureFrame,
        base: &[Bar],
        store: &mut P,
    ) -> Result<FeatureFrame, PipelineError> {
        let parser = self.volume_baseline(base, frame.timestamps(), store)?;
        let mut frame = frame.with_column(Column::VolumeBaseline, parser.clone())?;

        for column in Column::ALL {
            if !column.volume_scaled() || !frame.has_column(column) {
                continue;
            }
            let scaled = frame
                .column(column)?
                .iter()
                .zip(&parser)
                .map(|(value, p)| match (value, p) {
                    (Some(v), Some(p)) => Some((v * p).round()),
                    _ => None,
                })
                .collect();
            frame = frame.with_column(column, scaled)?;
        }

        let robust = self.params.plan.iter().filter_map(|(c, r)| match r {
            ScaleRule::Robust { sample } => Some((*c, *sample)),
            ScaleRule::ReadOnly { .. } => None,
        });
        for (column, sample) in robust {
            frame = self.robust_scale(frame, column, sample, store)?;
        }

        let read_only = self.params.plan.iter().filter_map(|(c, r)| match r {
            ScaleRule::ReadOnly { source } => Some((*c, *source)),
            ScaleRule::Robust { .. } => None,
        });
        for (column, source) in read_only {
            frame = self.apply_read_only(frame, column, source, store)?;
        }

        info!(
            rows = frame.len(),
            columns = self.params.plan.len(),
            "frame normalized"
        );
        Ok(frame)
    }

    /// Per-row volume parser aligned with `timestamps`
    ///
    /// A row at T uses the rolling mean of the last daily bar strictly before
    /// T's date; rows without one get `None`.
    pub fn volume_baseline<P: ParameterStore + ?Sized>(
        &self,
        base: &[Bar],
        timestamps: &[NaiveDateTime],
        store: &mut P,
    ) -> Result<Vec<Option<f64>>, PipelineError> {
        let daily = Resampler::new(Period::Daily).resample(base)?;
        if daily.is_empty() {
            debug!("no daily history for the volume baseline");
            return Ok(vec![None; timestamps.len()]);
        }

        let mut mean = RollingMean::new(self.params.baseline_window);
        let means: Vec<(NaiveDate, f64)> = daily
            .iter()
            .map(|d| (d.timestamp.date(), mean.push(d.volume as f64)))
            .collect();

        let computed = means.iter().map(|(_, m)| *m).fold(f64::MIN, f64::max);
        let key = Column::VolumeBaseline.name();
        let merged = store
            .merge_and_put(
                key,
                StoredBounds::Max(BaselineMax {
                    max: round_to(computed, BOUNDS_DECIMALS),
                }),
            )?
            .into_max(key)?;

        Ok(timestamps
            .iter()
            .map(|ts| {
                let before = means.partition_point(|(date, _)| *date < ts.date());
                before
                    .checked_sub(1)
                    .map(|i| means[i].1)
                    .filter(|m| *m > 0.0)
                    .map(|m| merged.max / m)
            })
            .collect())
    }

    /// `median ± k × 1.4826 × MAD`, rounded to 2 decimals
    ///
    /// `None` for an empty sample.
    pub fn robust_bounds(&self, values: &[f64]) -> Option<ScaleBounds> {
        let center = median(values.to_vec())?;
        let deviations: Vec<f64> = values.iter().map(|v| (v - center).abs()).collect();
        let mad = median(deviations)?;
        let spread = self.params.mad_multiplier * MAD_SCALE * mad;
        Some(ScaleBounds {
            low: round_to(center - spread, BOUNDS_DECIMALS),
            high: round_to(center + spread, BOUNDS_DECIMALS),
        })
    }

    fn robust_scale<P: ParameterStore + ?Sized>(
        &self,
        frame: FeatureFrame,
        column: Column,
        sample: Sample,
        store: &mut P,
    ) -> Result<FeatureFrame, PipelineError> {
        let name = column.name();
        let values = sample_values(&frame, column, sample)?;
        let bounds = match self.robust_bounds(&values) {
            Some(computed) => Some(
                store
                    .merge_and_put(name, StoredBounds::Range(computed))?
                    .into_range(name)?,
            ),
            None => store.get(name)?.map(|b| b.into_range(name)).transpose()?,
        };
        scale_with(frame, column, bounds)
    }

    fn apply_read_only<P: ParameterStore + ?Sized>(
        &self,
        frame: FeatureFrame,
        column: Column,
        source: Column,
        store: &P,
    ) -> Result<FeatureFrame, PipelineError> {
        let bounds = store
            .get(source.name())?
            .map(|b| b.into_range(source.name()))
            .transpose()?;
        scale_with(frame, column, bounds)
    }
}

/// Clip-and-scale `column`; missing bounds are an error only if it holds values
fn scale_with(
    frame: FeatureFrame,
    column: Column,
    bounds: Option<ScaleBounds>,
) -> Result<FeatureFrame, PipelineError> {
    let values = frame.column(column)?;
    let Some(bounds) = bounds else {
        if values.iter().any(Option::is_some) {
            return Err(PipelineError::MissingBounds {
                column: column.name().to_string(),
            });
        }
        debug!(column = column.name(), "skipping all-null column");
        return Ok(frame);
    };
    bounds.ensure_usable(column.name())?;

    let scaled = values
        .iter()
        .map(|v| v.map(|x| bounds.normalize(x)))
        .collect();
    frame.with_column(column, scaled)
}

fn sample_values(
    frame: &FeatureFrame,
    column: Column,
    sample: Sample,
) -> Result<Vec<f64>, PipelineError> {
    let values = frame.column(column)?;
    Ok(match sample {
        Sample::All => values.iter().flatten().copied().collect(),
        Sample::CycleRepresentative => values
            .iter()
            .zip(frame.cycle_starts())
            .filter(|(_, start)| **start)
            .filter_map(|(v, _)| *v)
            .collect(),
        Sample::Distinct => {
            let mut seen = HashSet::new();
            values
                .iter()
                .flatten()
                .copied()
                .filter(|v| seen.insert(v.to_bits()))
                .collect()
        }
    })
}

/// Median with the mean of the two middle values for even lengths
fn median(mut values: Vec<f64>) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    Some(if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    })
}

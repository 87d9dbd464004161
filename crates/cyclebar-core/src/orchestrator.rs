//! Per-series run: initial or incremental, committed at the end
//!
//! ```text
//! read checkpoint ─┬─ absent  → Initial:     bars since initial_since
//!                  └─ present → Incremental: bars since next_start - warmup
//! resample → detect → statistics → settled → normalize → matrices
//! commit: derived bars → bounds → matrices → checkpoint
//! ```
//!
//! Nothing is written before the commit phase, and the checkpoint is written
//! last, so a failed run leaves the previous checkpoint in force.

use crate::checkpoint::{AnomalySummary, Checkpoint};
use crate::cycle::{CycleBar, CycleStatistics, CycleTable, StatisticsParams};
use crate::errors::PipelineError;
use crate::frame::FeatureFrame;
use crate::ingest;
use crate::matrix::{FeatureMatrix, MatrixBuilder, MatrixShape, ModelSpec};
use crate::normalize::{Normalizer, NormalizerParams, StagedBounds, StoredBounds};
use crate::resample::Resampler;
use crate::signal::{SignalDetector, SignalParams};
use crate::store::{PipelineStore, SeriesKey, StoreError};
use crate::types::{Bar, Period};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info, warn};

/// Everything a run needs besides the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineParams {
    /// Target period of the derived bars
    pub period: Period,
    pub signal: SignalParams,
    pub statistics: StatisticsParams,
    pub normalizer: NormalizerParams,
    pub shape: MatrixShape,
    pub models: Vec<ModelSpec>,
    /// Extra history reloaded before the checkpoint's next start
    pub warmup_days: i64,
    /// Cycles kept in the look-back window of the next run
    pub checkpoint_cycles: usize,
    /// Provisional cycles longer than this are reported as stale
    pub max_provisional_bars: usize,
    /// Start of history for initial runs (`None` = everything)
    pub initial_since: Option<NaiveDateTime>,
}

impl Default for PipelineParams {
    fn default() -> Self {
        Self {
            period: Period::Minutes(15),
            signal: SignalParams::default(),
            statistics: StatisticsParams::default(),
            normalizer: NormalizerParams::default(),
            shape: MatrixShape::default(),
            models: ModelSpec::defaults(),
            warmup_days: 30,
            checkpoint_cycles: 6,
            max_provisional_bars: 160,
            initial_since: None,
        }
    }
}

impl PipelineParams {
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.warmup_days < 0 {
            return Err(PipelineError::invalid_parameter(
                "warmup_days",
                format!("must not be negative, got {}", self.warmup_days),
            ));
        }
        if Duration::try_days(self.warmup_days).is_none() {
            return Err(PipelineError::invalid_parameter(
                "warmup_days",
                format!("{} days is out of range", self.warmup_days),
            ));
        }
        if self.checkpoint_cycles == 0 {
            return Err(PipelineError::invalid_parameter(
                "checkpoint_cycles",
                "must be at least 1",
            ));
        }
        let mut names = HashSet::new();
        for model in &self.models {
            model.check_width(self.shape)?;
            if !names.insert(model.name.as_str()) {
                return Err(PipelineError::invalid_parameter(
                    "models",
                    format!("model '{}' defined twice", model.name),
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunMode {
    Initial,
    Incremental,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunOutcome {
    /// Derived bars, bounds, matrices and checkpoint written
    Committed,
    /// No settled cycle; nothing persisted
    NoCycles,
    /// No base bar newer than the checkpoint; nothing persisted
    NoNewData,
}

/// What one run did
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub key: SeriesKey,
    pub mode: RunMode,
    pub outcome: RunOutcome,
    pub base_bars: usize,
    pub period_bars: usize,
    pub settled_cycles: usize,
    pub derived_rows_written: usize,
    /// Slices emitted per model
    pub matrices: BTreeMap<String, usize>,
    pub provisional_bars: usize,
    /// Provisional cycle longer than `max_provisional_bars`
    pub stale_provisional: bool,
    pub anomalies: AnomalySummary,
    pub checkpoint: Option<Checkpoint>,
}

impl RunReport {
    fn new(key: SeriesKey, mode: RunMode) -> Self {
        Self {
            key,
            mode,
            outcome: RunOutcome::NoNewData,
            base_bars: 0,
            period_bars: 0,
            settled_cycles: 0,
            derived_rows_written: 0,
            matrices: BTreeMap::new(),
            provisional_bars: 0,
            stale_provisional: false,
            anomalies: AnomalySummary::default(),
            checkpoint: None,
        }
    }
}

/// Sequences every stage for one series
#[derive(Debug, Clone)]
pub struct Orchestrator {
    params: PipelineParams,
    resampler: Resampler,
    detector: SignalDetector,
    statistics: CycleStatistics,
    normalizer: Normalizer,
    builder: MatrixBuilder,
}

/// Output of the compute phase, ready to commit
struct Staged {
    settled: CycleTable,
    /// Newest base bar of the window
    base_end: NaiveDateTime,
    bounds: BTreeMap<String, StoredBounds>,
    matrices: Vec<(String, FeatureMatrix)>,
}

impl Orchestrator {
    pub fn new(params: PipelineParams) -> Result<Self, PipelineError> {
        params.validate()?;
        Ok(Self {
            resampler: Resampler::new(params.period),
            detector: SignalDetector::new(params.signal)?,
            statistics: CycleStatistics::new(params.statistics)?,
            normalizer: Normalizer::new(params.normalizer.clone())?,
            builder: MatrixBuilder::new(params.shape)?,
            params,
        })
    }

    pub fn params(&self) -> &PipelineParams {
        &self.params
    }

    /// Run one symbol to completion against `store`
    pub fn run<S: PipelineStore + ?Sized>(
        &self,
        store: &mut S,
        symbol: &str,
    ) -> Result<RunReport, PipelineError> {
        let key = SeriesKey::new(symbol, self.params.period.label());
        let previous = store.read_checkpoint(&key)?;
        if let Some(checkpoint) = &previous {
            checkpoint.validate()?;
        }

        let mode = match previous {
            Some(_) => RunMode::Incremental,
            None => RunMode::Initial,
        };
        let since = match &previous {
            Some(cp) => Some(self.window_start(cp)?),
            None => self.params.initial_since,
        };

        let mut report = RunReport::new(key.clone(), mode);
        let ingested = ingest::sanitize(store.load_base_bars(symbol, since)?)?;
        let base = ingested.bars;
        report.base_bars = base.len();
        report.anomalies = ingested.anomalies;

        let newest = base.last().map(|b| b.timestamp);
        let has_new = match (&previous, newest) {
            (_, None) => false,
            (Some(cp), Some(newest)) => newest > cp.processed_until(),
            (None, Some(_)) => true,
        };
        if !has_new {
            info!(series = %key, ?mode, "no new base bars");
            return Ok(report);
        }

        let window = Window {
            since: previous.as_ref().and(since),
            base: &base,
        };
        let Some(staged) = self.compute(store, &key, window, previous.as_ref(), &mut report)? else {
            report.outcome = RunOutcome::NoCycles;
            info!(series = %key, ?mode, periods = report.period_bars, "no settled cycles");
            return Ok(report);
        };

        let checkpoint = self.commit(store, &key, staged, previous, &mut report)?;
        report.checkpoint = Some(checkpoint);
        report.outcome = RunOutcome::Committed;
        info!(
            series = %key,
            ?mode,
            cycles = report.settled_cycles,
            rows = report.derived_rows_written,
            "run committed"
        );
        Ok(report)
    }

    /// Incremental window start: the checkpoint's next start minus the warm-up
    fn window_start(&self, checkpoint: &Checkpoint) -> Result<NaiveDateTime, PipelineError> {
        Duration::try_days(self.params.warmup_days)
            .and_then(|warmup| checkpoint.next_start_date.checked_sub_signed(warmup))
            .ok_or_else(|| {
                PipelineError::invalid_parameter(
                    "warmup_days",
                    format!(
                        "{} days before {} is out of range",
                        self.params.warmup_days, checkpoint.next_start_date
                    ),
                )
            })
    }

    /// Base bars the volume baseline is computed over
    ///
    /// The rolling daily mean needs `baseline_window` trading days before the
    /// window, so incremental runs read that history back (all of it when the
    /// bounded read comes up short) and prepend it to the window.
    fn baseline_history<'a, S: PipelineStore + ?Sized>(
        &self,
        store: &S,
        symbol: &str,
        window: Window<'a>,
    ) -> Result<Cow<'a, [Bar]>, PipelineError> {
        let Some(since) = window.since else {
            return Ok(Cow::Borrowed(window.base));
        };

        let needed = self.params.normalizer.baseline_window;
        let reach = i64::try_from(needed)
            .ok()
            .and_then(|days| days.checked_mul(2))
            .and_then(Duration::try_days)
            .and_then(|span| since.checked_sub_signed(span));

        let mut history = load_before(store, symbol, reach, since)?;
        if reach.is_some() && trading_days(&history) < needed {
            history = load_before(store, symbol, None, since)?;
        }
        debug!(
            symbol,
            days = trading_days(&history),
            needed,
            "volume baseline history loaded"
        );
        history.extend_from_slice(window.base);
        Ok(Cow::Owned(history))
    }

    /// Pure compute phase; `None` when there is no settled cycle
    fn compute<S: PipelineStore + ?Sized>(
        &self,
        store: &S,
        key: &SeriesKey,
        window: Window<'_>,
        previous: Option<&Checkpoint>,
        report: &mut RunReport,
    ) -> Result<Option<Staged>, PipelineError> {
        let base = window.base;
        let Some(base_end) = base.last().map(|b| b.timestamp) else {
            return Ok(None);
        };
        let period_bars = self.resampler.resample(base)?;
        report.period_bars = period_bars.len();
        info!(series = %key, base = base.len(), periods = period_bars.len(), "resampled");

        let series = self.detector.detect(&period_bars)?;
        let table = self.statistics.compute(&series, base);
        let settled = table.settled();
        if settled.cycles.is_empty() {
            return Ok(None);
        }
        report.settled_cycles = settled.cycles.len();
        report.provisional_bars = table.provisional_bars();
        info!(
            series = %key,
            cycles = table.cycles.len(),
            settled = settled.cycles.len(),
            "cycles resolved"
        );

        if report.provisional_bars > self.params.max_provisional_bars {
            report.stale_provisional = true;
            warn!(
                series = %key,
                provisional_bars = report.provisional_bars,
                limit = self.params.max_provisional_bars,
                "provisional cycle still open past the staleness limit"
            );
        }

        let history = self.baseline_history(store, &key.symbol, window)?;
        let mut bounds = StagedBounds::new(store, key);
        let frame = self.normalizer.normalize(
            FeatureFrame::from_cycle_bars(&settled.bars),
            &history,
            &mut bounds,
        )?;
        let bounds = bounds.into_pending();

        let mut matrices = Vec::with_capacity(self.params.models.len());
        for model in &self.params.models {
            let watermark = previous.and_then(|cp| cp.emitted_for(&model.name));
            let matrix = self
                .builder
                .build_for(&frame, model, |id| watermark.map_or(true, |w| id > w))?;
            debug!(series = %key, model = %model.name, slices = matrix.len(), "matrix built");
            matrices.push((model.name.clone(), matrix));
        }

        Ok(Some(Staged {
            settled,
            base_end,
            bounds,
            matrices,
        }))
    }

    fn commit<S: PipelineStore + ?Sized>(
        &self,
        store: &mut S,
        key: &SeriesKey,
        staged: Staged,
        previous: Option<Checkpoint>,
        report: &mut RunReport,
    ) -> Result<Checkpoint, PipelineError> {
        report.derived_rows_written =
            write_derived(store, key, &staged.settled.bars, previous.as_ref())?;

        for (column, bounds) in &staged.bounds {
            store.write_normalization_bounds(key, column, bounds)?;
        }

        let mut emitted = Vec::new();
        for (model, matrix) in &staged.matrices {
            report.matrices.insert(model.clone(), matrix.len());
            let Some(last) = matrix.last_cycle() else {
                continue;
            };
            store.persist_feature_matrix(key, model, matrix)?;
            emitted.push((model.as_str(), last));
        }

        let mut checkpoint = self.next_checkpoint(&staged, previous.as_ref())?;
        for (model, last) in emitted {
            checkpoint.record_emitted(model, last);
        }
        checkpoint.anomaly_summary.absorb(&report.anomalies);
        store.write_checkpoint(key, &checkpoint)?;
        Ok(checkpoint)
    }

    /// Checkpoint for the staged run, carrying over watermarks and anomaly counts
    ///
    /// End fields describe the last settled row and cycle. The next run starts
    /// at the `checkpoint_cycles`-th last settled cycle (the first one when
    /// fewer have settled).
    fn next_checkpoint(
        &self,
        staged: &Staged,
        previous: Option<&Checkpoint>,
    ) -> Result<Checkpoint, PipelineError> {
        let cycles = &staged.settled.cycles;
        let (Some(last), Some(signal)) = (staged.settled.bars.last(), cycles.last()) else {
            return Err(PipelineError::invalid_parameter(
                "checkpoint",
                "no settled cycle to record",
            ));
        };
        let next_start_date =
            cycles[cycles.len().saturating_sub(self.params.checkpoint_cycles)].start_time;

        let checkpoint = Checkpoint {
            end_date: last.timestamp,
            end_signal: signal.direction,
            end_signal_cycle: signal.id,
            end_signal_start_time: signal.start_time,
            next_start_date,
            base_end_date: Some(staged.base_end),
            emitted: previous.map(|cp| cp.emitted.clone()).unwrap_or_default(),
            anomaly_summary: previous
                .map(|cp| cp.anomaly_summary.clone())
                .unwrap_or_default(),
        };
        checkpoint.validate()?;
        Ok(checkpoint)
    }
}

/// Base bars handed to a run
#[derive(Clone, Copy)]
struct Window<'a> {
    /// Lower bound the window was loaded from (`None` = all history)
    since: Option<NaiveDateTime>,
    base: &'a [Bar],
}

/// Sanitized base bars in `[from, until)`
fn load_before<S: PipelineStore + ?Sized>(
    store: &S,
    symbol: &str,
    from: Option<NaiveDateTime>,
    until: NaiveDateTime,
) -> Result<Vec<Bar>, PipelineError> {
    let mut rows = store.load_base_bars(symbol, from)?;
    rows.retain(|r| r.timestamp < until);
    Ok(ingest::sanitize(rows)?.bars)
}

/// Distinct trading dates in sorted `bars`
fn trading_days(bars: &[Bar]) -> usize {
    let mut dates: Vec<NaiveDate> = bars.iter().map(|b| b.timestamp.date()).collect();
    dates.dedup();
    dates.len()
}

/// Persist settled rows; returns the number of rows written
///
/// Initial runs replace the series. Incremental runs append the rows from the
/// previous look-back start on; on a duplicate key the stored series is
/// extended with the rows strictly newer than its last row and replaced.
fn write_derived<S: PipelineStore + ?Sized>(
    store: &mut S,
    key: &SeriesKey,
    settled: &[CycleBar],
    previous: Option<&Checkpoint>,
) -> Result<usize, PipelineError> {
    let Some(checkpoint) = previous else {
        store.replace_derived_bars(key, settled)?;
        return Ok(settled.len());
    };

    let from = settled.partition_point(|b| b.timestamp < checkpoint.next_start_date);
    let candidates = &settled[from..];
    if candidates.is_empty() {
        return Ok(0);
    }

    match store.append_derived_bars(key, candidates) {
        Ok(()) => Ok(candidates.len()),
        Err(StoreError::DuplicateKey { timestamp, .. }) => {
            warn!(series = %key, %timestamp, "derived bars overlap; merging and replacing");
            let mut existing = store.load_derived_bars(key)?;
            let last = existing.last().map(|b| b.timestamp);
            let newer: Vec<CycleBar> = candidates
                .iter()
                .filter(|b| last.map_or(true, |t| b.timestamp > t))
                .cloned()
                .collect();
            let written = newer.len();
            existing.extend(newer);
            store.replace_derived_bars(key, &existing)?;
            Ok(written)
        }
        Err(other) => Err(other.into()),
    }
}

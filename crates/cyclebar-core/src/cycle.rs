//! Per-cycle statistics
//!
//! For each tagged cycle:
//!
//! - end extreme: first bar at the min low (downturn) / max high (upturn) in the cycle
//! - start extreme: the previous cycle's end extreme (absent for the first cycle)
//! - amplitude `(end - start) / start` and per-bar amplitude, rounded to 3 decimals
//! - length (last index - first index) and per-bar position
//! - volume peaks from the base bars: within the cycle window, in a trailing
//!   look-back before each bar, and over the previous trading session
//! - prev/next links of amplitude, length and cycle volume peaks
//!
//! The last cycle is provisional; [`CycleTable::settled`] drops it.

use crate::errors::PipelineError;
use crate::signal::{CycleTag, SignalSeries};
use crate::types::{round_to, Bar, CycleId, Direction};
use crate::volume::{top_mean, BaseIndex, SessionPeaks};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

const AMPLITUDE_DECIMALS: i32 = 3;

/// Statistics settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatisticsParams {
    /// Trailing window for the per-bar volume peaks, in minutes
    pub lookback_minutes: i64,
}

impl Default for StatisticsParams {
    fn default() -> Self {
        Self {
            lookback_minutes: 15,
        }
    }
}

/// Price extreme anchoring a cycle boundary
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Extreme {
    pub index: usize,
    pub time: NaiveDateTime,
    pub price: f64,
}

/// One cycle, index-based
#[derive(Debug, Clone, PartialEq)]
pub struct CycleSummary {
    pub id: CycleId,
    pub direction: Direction,
    /// Time of the signal bar opening the cycle
    pub start_time: NaiveDateTime,
    pub first_index: usize,
    pub last_index: usize,
    pub start: Option<Extreme>,
    pub end: Extreme,
    pub amplitude: Option<f64>,
    pub length: u32,
    pub vol_peak1: Option<f64>,
    pub vol_peak5: Option<f64>,
    /// Previous-session peak-5 as seen at the end extreme
    pub end_session_vol_peak5: Option<f64>,
}

impl CycleSummary {
    pub fn bar_count(&self) -> usize {
        self.last_index - self.first_index + 1
    }
}

/// Derived bar: a period bar with its cycle statistics
///
/// Flat and optional-heavy so it persists as one CSV row.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CycleBar {
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
    pub money: u64,

    pub direction: Option<Direction>,
    pub cycle_id: Option<CycleId>,
    /// True on the signal bar opening the cycle
    pub cycle_start: bool,
    pub cycle_start_time: Option<NaiveDateTime>,

    pub start_price: Option<f64>,
    pub start_price_time: Option<NaiveDateTime>,
    pub end_price: Option<f64>,
    pub end_price_time: Option<NaiveDateTime>,

    pub amplitude_per_bar: Option<f64>,
    pub amplitude: Option<f64>,
    pub length: Option<u32>,
    pub position: Option<u32>,

    pub cycle_vol_peak1: Option<f64>,
    pub cycle_vol_peak5: Option<f64>,
    pub bar_vol_peak1: Option<f64>,
    pub bar_vol_peak5: Option<f64>,
    pub session_vol_peak1: Option<f64>,
    pub session_vol_peak5: Option<f64>,
    pub session_vol_peak15: Option<f64>,
    pub end_session_vol_peak5: Option<f64>,

    pub prev_amplitude: Option<f64>,
    pub next_amplitude: Option<f64>,
    pub prev_length: Option<u32>,
    pub next_length: Option<u32>,
    pub prev_vol_peak1: Option<f64>,
    pub next_vol_peak1: Option<f64>,
    pub prev_vol_peak5: Option<f64>,
    pub next_vol_peak5: Option<f64>,

    #[serde(default)]
    pub boll_mid: Option<f64>,
    #[serde(default)]
    pub boll_std: Option<f64>,
    #[serde(default)]
    pub boll_up: Option<f64>,
    #[serde(default)]
    pub boll_dn: Option<f64>,
    #[serde(default)]
    pub stop_loss: Option<f64>,
}

impl CycleBar {
    fn from_bar(bar: &Bar) -> Self {
        Self {
            timestamp: bar.timestamp,
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            volume: bar.volume,
            money: bar.money,
            ..Default::default()
        }
    }

    pub fn bar(&self) -> Bar {
        Bar {
            timestamp: self.timestamp,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
            money: self.money,
        }
    }
}

/// Derived bars plus their cycle summaries
#[derive(Debug, Clone, Default)]
pub struct CycleTable {
    pub bars: Vec<CycleBar>,
    pub cycles: Vec<CycleSummary>,
}

impl CycleTable {
    pub fn has_cycles(&self) -> bool {
        !self.cycles.is_empty()
    }

    /// The in-progress last cycle
    pub fn provisional(&self) -> Option<&CycleSummary> {
        self.cycles.last()
    }

    /// Bars belonging to the provisional cycle
    pub fn provisional_bars(&self) -> usize {
        self.provisional().map_or(0, |c| self.bars.len() - c.first_index)
    }

    /// Table without the provisional cycle, neighbours re-linked
    ///
    /// The last settled cycle ends up with no `next_*` values.
    pub fn settled(&self) -> CycleTable {
        let Some(last) = self.cycles.last() else {
            return self.clone();
        };
        let mut bars = self.bars[..last.first_index].to_vec();
        let cycles = self.cycles[..self.cycles.len() - 1].to_vec();
        link_neighbours(&mut bars, &cycles);
        CycleTable { bars, cycles }
    }
}

/// Cycle statistics calculator
#[derive(Debug, Clone, Copy, Default)]
pub struct CycleStatistics {
    params: StatisticsParams,
}

impl CycleStatistics {
    pub fn new(params: StatisticsParams) -> Result<Self, PipelineError> {
        if params.lookback_minutes <= 0 {
            return Err(PipelineError::invalid_parameter(
                "lookback_minutes",
                format!("must be positive, got {}", params.lookback_minutes),
            ));
        }
        Ok(Self { params })
    }

    /// Resolve every cycle of `series`; volume peaks read from `base`
    ///
    /// `base` must be the strictly increasing base-resolution bars covering the
    /// same time range as `series`.
    pub fn compute(&self, series: &SignalSeries, base: &[Bar]) -> CycleTable {
        let index = BaseIndex::new(base);
        let sessions = index.session_peaks();

        let mut bars: Vec<CycleBar> = series
            .bars
            .iter()
            .map(|sb| {
                let mut row = CycleBar::from_bar(&sb.bar);
                let trailing = index.trailing(sb.bar.timestamp, self.params.lookback_minutes);
                row.bar_vol_peak1 = top_mean(trailing.iter().map(|b| b.volume), 1);
                row.bar_vol_peak5 = top_mean(trailing.iter().map(|b| b.volume), 5);
                let session = previous_session(&sessions, sb.bar.timestamp.date());
                row.session_vol_peak1 = session.peak1;
                row.session_vol_peak5 = session.peak5;
                row.session_vol_peak15 = session.peak15;
                row.boll_mid = Some(sb.bands.mid);
                row.boll_std = sb.bands.std;
                row.boll_up = sb.bands.up;
                row.boll_dn = sb.bands.dn;
                row.stop_loss = sb.bands.stop_loss;
                row
            })
            .collect();

        let spans = cycle_spans(series);
        let mut cycles: Vec<CycleSummary> = Vec::with_capacity(spans.len());

        for (tag, first, last) in spans {
            let end = end_extreme(series, tag.direction, first, last);
            let start = cycles.last().map(|prev| prev.end);
            let window_from = start.map_or(series.bars[first].bar.timestamp, |s| s.time);
            let window = index.closed(window_from, end.time);
            let amplitude =
                start.map(|s| round_to((end.price - s.price) / s.price, AMPLITUDE_DECIMALS));

            cycles.push(CycleSummary {
                id: tag.id,
                direction: tag.direction,
                start_time: tag.start_time,
                first_index: first,
                last_index: last,
                start,
                end,
                amplitude,
                length: (last - first) as u32,
                vol_peak1: top_mean(window.iter().map(|b| b.volume), 1),
                vol_peak5: top_mean(window.iter().map(|b| b.volume), 5),
                end_session_vol_peak5: bars[end.index].session_vol_peak5,
            });
        }

        for cycle in &cycles {
            for (offset, row) in bars[cycle.first_index..=cycle.last_index]
                .iter_mut()
                .enumerate()
            {
                fill_cycle_fields(row, cycle, offset);
            }
        }
        link_neighbours(&mut bars, &cycles);

        debug!(
            bars = bars.len(),
            cycles = cycles.len(),
            base_bars = base.len(),
            "cycle statistics computed"
        );
        CycleTable { bars, cycles }
    }
}

fn fill_cycle_fields(row: &mut CycleBar, cycle: &CycleSummary, offset: usize) {
    row.direction = Some(cycle.direction);
    row.cycle_id = Some(cycle.id);
    row.cycle_start = offset == 0;
    row.cycle_start_time = Some(cycle.start_time);
    row.start_price = cycle.start.map(|s| s.price);
    row.start_price_time = cycle.start.map(|s| s.time);
    row.end_price = Some(cycle.end.price);
    row.end_price_time = Some(cycle.end.time);
    row.amplitude = cycle.amplitude;
    let reached = row.bar().extreme(cycle.direction);
    row.amplitude_per_bar = cycle
        .start
        .map(|s| round_to((reached - s.price) / s.price, AMPLITUDE_DECIMALS));
    row.length = Some(cycle.length);
    row.position = Some(offset as u32);
    row.cycle_vol_peak1 = cycle.vol_peak1;
    row.cycle_vol_peak5 = cycle.vol_peak5;
    row.end_session_vol_peak5 = cycle.end_session_vol_peak5;
}

/// Copy neighbouring cycles' values onto every bar of each cycle
fn link_neighbours(bars: &mut [CycleBar], cycles: &[CycleSummary]) {
    for (n, cycle) in cycles.iter().enumerate() {
        let prev = n.checked_sub(1).and_then(|p| cycles.get(p));
        let next = cycles.get(n + 1);
        for row in &mut bars[cycle.first_index..=cycle.last_index] {
            row.prev_amplitude = prev.and_then(|c| c.amplitude);
            row.prev_length = prev.map(|c| c.length);
            row.prev_vol_peak1 = prev.and_then(|c| c.vol_peak1);
            row.prev_vol_peak5 = prev.and_then(|c| c.vol_peak5);
            row.next_amplitude = next.and_then(|c| c.amplitude);
            row.next_length = next.map(|c| c.length);
            row.next_vol_peak1 = next.and_then(|c| c.vol_peak1);
            row.next_vol_peak5 = next.and_then(|c| c.vol_peak5);
        }
    }
}

/// (tag, first index, last index) for each tagged cycle in order
fn cycle_spans(series: &SignalSeries) -> Vec<(CycleTag, usize, usize)> {
    let mut spans: Vec<(CycleTag, usize, usize)> = Vec::new();
    for (i, sb) in series.bars.iter().enumerate() {
        let Some(tag) = sb.cycle else { continue };
        match spans.last_mut() {
            Some((open, _, last)) if open.id == tag.id => *last = i,
            _ => spans.push((tag, i, i)),
        }
    }
    spans
}

fn end_extreme(series: &SignalSeries, direction: Direction, first: usize, last: usize) -> Extreme {
    let mut best = first;
    for i in first + 1..=last {
        let candidate = series.bars[i].bar.extreme(direction);
        let current = series.bars[best].bar.extreme(direction);
        let better = match direction {
            Direction::Upturn => candidate > current,
            Direction::Downturn => candidate < current,
        };
        if better {
            best = i;
        }
    }
    let bar = &series.bars[best].bar;
    Extreme {
        index: best,
        time: bar.timestamp,
        price: bar.extreme(direction),
    }
}

/// Peaks of the last trading date strictly before `date`
fn previous_session(sessions: &BTreeMap<NaiveDate, SessionPeaks>, date: NaiveDate) -> SessionPeaks {
    sessions
        .range(..date)
        .next_back()
        .map(|(_, peaks)| *peaks)
        .unwrap_or_default()
}

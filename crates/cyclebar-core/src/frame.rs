//! Typed column schema and the columnar feature frame

use crate::cycle::CycleBar;
use crate::errors::PipelineError;
use crate::types::CycleId;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Range;
use std::str::FromStr;

/// Semantic role of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnRole {
    /// Bookkeeping, never scaled
    Id,
    /// Model input
    Feature,
    /// Volume-type model input, multiplied by the volume baseline parser
    Volume,
    /// Forward-looking value taken from the next cycle
    Label,
}

/// Every numeric column the pipeline knows about
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub enum Column {
    Direction,
    Volume,
    AmplitudePerBar,
    Amplitude,
    Length,
    Position,
    CycleVolPeak1,
    CycleVolPeak5,
    BarVolPeak1,
    BarVolPeak5,
    SessionVolPeak1,
    SessionVolPeak5,
    SessionVolPeak15,
    EndSessionVolPeak5,
    PrevAmplitude,
    NextAmplitude,
    PrevLength,
    NextLength,
    PrevVolPeak1,
    NextVolPeak1,
    PrevVolPeak5,
    NextVolPeak5,
    BollMid,
    BollStd,
    BollUp,
    BollDn,
    /// Two deviations under the lower band
    StopLoss,
    /// Per-bar volume baseline parser (persisted max / rolling mean)
    VolumeBaseline,
}

impl Column {
    pub const ALL: [Column; 28] = [
        Column::Direction,
        Column::Volume,
        Column::AmplitudePerBar,
        Column::Amplitude,
        Column::Length,
        Column::Position,
        Column::CycleVolPeak1,
        Column::CycleVolPeak5,
        Column::BarVolPeak1,
        Column::BarVolPeak5,
        Column::SessionVolPeak1,
        Column::SessionVolPeak5,
        Column::SessionVolPeak15,
        Column::EndSessionVolPeak5,
        Column::PrevAmplitude,
        Column::NextAmplitude,
        Column::PrevLength,
        Column::NextLength,
        Column::PrevVolPeak1,
        Column::NextVolPeak1,
        Column::PrevVolPeak5,
        Column::NextVolPeak5,
        Column::BollMid,
        Column::BollStd,
        Column::BollUp,
        Column::BollDn,
        Column::StopLoss,
        Column::VolumeBaseline,
    ];

    /// Stable snake_case name, used as the bounds record key
    pub fn name(self) -> &'static str {
        match self {
            Column::Direction => "direction",
            Column::Volume => "volume",
            Column::AmplitudePerBar => "amplitude_per_bar",
            Column::Amplitude => "amplitude",
            Column::Length => "length",
            Column::Position => "position",
            Column::CycleVolPeak1 => "cycle_vol_peak1",
            Column::CycleVolPeak5 => "cycle_vol_peak5",
            Column::BarVolPeak1 => "bar_vol_peak1",
            Column::BarVolPeak5 => "bar_vol_peak5",
            Column::SessionVolPeak1 => "session_vol_peak1",
            Column::SessionVolPeak5 => "session_vol_peak5",
            Column::SessionVolPeak15 => "session_vol_peak15",
            Column::EndSessionVolPeak5 => "end_session_vol_peak5",
            Column::PrevAmplitude => "prev_amplitude",
            Column::NextAmplitude => "next_amplitude",
            Column::PrevLength => "prev_length",
            Column::NextLength => "next_length",
            Column::PrevVolPeak1 => "prev_vol_peak1",
            Column::NextVolPeak1 => "next_vol_peak1",
            Column::PrevVolPeak5 => "prev_vol_peak5",
            Column::NextVolPeak5 => "next_vol_peak5",
            Column::BollMid => "boll_mid",
            Column::BollStd => "boll_std",
            Column::BollUp => "boll_up",
            Column::BollDn => "boll_dn",
            Column::StopLoss => "stop_loss",
            Column::VolumeBaseline => "volume_baseline",
        }
    }

    pub fn role(self) -> ColumnRole {
        match self {
            Column::Direction | Column::VolumeBaseline => ColumnRole::Id,
            Column::NextAmplitude
            | Column::NextLength
            | Column::NextVolPeak1
            | Column::NextVolPeak5 => ColumnRole::Label,
            Column::Volume
            | Column::CycleVolPeak1
            | Column::CycleVolPeak5
            | Column::BarVolPeak1
            | Column::BarVolPeak5
            | Column::SessionVolPeak1
            | Column::SessionVolPeak5
            | Column::SessionVolPeak15
            | Column::EndSessionVolPeak5
            | Column::PrevVolPeak1
            | Column::PrevVolPeak5 => ColumnRole::Volume,
            _ => ColumnRole::Feature,
        }
    }

    /// Whether the baseline parser multiplies this column before scaling
    pub fn volume_scaled(self) -> bool {
        matches!(self, Column::Volume) || self.name().contains("vol_peak")
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Column {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Column::ALL
            .iter()
            .copied()
            .find(|c| c.name() == s)
            .ok_or_else(|| PipelineError::MissingColumn {
                column: s.to_string(),
            })
    }
}

impl TryFrom<String> for Column {
    type Error = PipelineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Column> for String {
    fn from(value: Column) -> Self {
        value.name().to_string()
    }
}

/// Columnar view of derived bars
///
/// Each stage returns a new frame; columns are replaced, never edited in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureFrame {
    timestamps: Vec<NaiveDateTime>,
    cycle_ids: Vec<Option<CycleId>>,
    cycle_starts: Vec<bool>,
    columns: BTreeMap<Column, Vec<Option<f64>>>,
}

impl FeatureFrame {
    /// All columns except [`Column::VolumeBaseline`], which the normalizer adds
    pub fn from_cycle_bars(bars: &[CycleBar]) -> Self {
        let mut columns: BTreeMap<Column, Vec<Option<f64>>> = BTreeMap::new();
        let len = |v: Option<u32>| v.map(f64::from);
        for column in Column::ALL {
            if column == Column::VolumeBaseline {
                continue;
            }
            let values = bars
                .iter()
                .map(|b| match column {
                    Column::Direction => b.direction.map(|d| d.sign()),
                    Column::Volume => Some(b.volume as f64),
                    Column::AmplitudePerBar => b.amplitude_per_bar,
                    Column::Amplitude => b.amplitude,
                    Column::Length => len(b.length),
                    Column::Position => len(b.position),
                    Column::CycleVolPeak1 => b.cycle_vol_peak1,
                    Column::CycleVolPeak5 => b.cycle_vol_peak5,
                    Column::BarVolPeak1 => b.bar_vol_peak1,
                    Column::BarVolPeak5 => b.bar_vol_peak5,
                    Column::SessionVolPeak1 => b.session_vol_peak1,
                    Column::SessionVolPeak5 => b.session_vol_peak5,
                    Column::SessionVolPeak15 => b.session_vol_peak15,
                    Column::EndSessionVolPeak5 => b.end_session_vol_peak5,
                    Column::PrevAmplitude => b.prev_amplitude,
                    Column::NextAmplitude => b.next_amplitude,
                    Column::PrevLength => len(b.prev_length),
                    Column::NextLength => len(b.next_length),
                    Column::PrevVolPeak1 => b.prev_vol_peak1,
                    Column::NextVolPeak1 => b.next_vol_peak1,
                    Column::PrevVolPeak5 => b.prev_vol_peak5,
                    Column::NextVolPeak5 => b.next_vol_peak5,
                    Column::BollMid => b.boll_mid,
                    Column::BollStd => b.boll_std,
                    Column::BollUp => b.boll_up,
                    Column::BollDn => b.boll_dn,
                    Column::StopLoss => b.stop_loss,
                    Column::VolumeBaseline => None,
                })
                .collect();
            columns.insert(column, values);
        }

        Self {
            timestamps: bars.iter().map(|b| b.timestamp).collect(),
            cycle_ids: bars.iter().map(|b| b.cycle_id).collect(),
            cycle_starts: bars.iter().map(|b| b.cycle_start).collect(),
            columns,
        }
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn timestamps(&self) -> &[NaiveDateTime] {
        &self.timestamps
    }

    pub fn cycle_ids(&self) -> &[Option<CycleId>] {
        &self.cycle_ids
    }

    /// True on the first row of each cycle
    pub fn cycle_starts(&self) -> &[bool] {
        &self.cycle_starts
    }

    pub fn has_column(&self, column: Column) -> bool {
        self.columns.contains_key(&column)
    }

    pub fn column(&self, column: Column) -> Result<&[Option<f64>], PipelineError> {
        self.columns
            .get(&column)
            .map(Vec::as_slice)
            .ok_or_else(|| PipelineError::MissingColumn {
                column: column.name().to_string(),
            })
    }

    /// Frame with `column` replaced (or added)
    pub fn with_column(
        mut self,
        column: Column,
        values: Vec<Option<f64>>,
    ) -> Result<Self, PipelineError> {
        if values.len() != self.len() {
            return Err(PipelineError::invalid_parameter(
                "column",
                format!(
                    "'{}' has {} values for {} rows",
                    column,
                    values.len(),
                    self.len()
                ),
            ));
        }
        self.columns.insert(column, values);
        Ok(self)
    }

    /// Row ranges of each cycle, in order
    pub fn cycle_rows(&self) -> Vec<(CycleId, Range<usize>)> {
        let mut out: Vec<(CycleId, Range<usize>)> = Vec::new();
        for (i, id) in self.cycle_ids.iter().enumerate() {
            let Some(id) = *id else { continue };
            match out.last_mut() {
                Some((open, range)) if *open == id => range.end = i + 1,
                _ => out.push((id, i..i + 1)),
            }
        }
        out
    }
}

//! Year-partitioned CSV bar files
//!
//! Base partitions hold `timestamp,open,high,low,close,volume,money` rows where
//! any value but the timestamp may be blank. Derived partitions are the
//! serialized [`CycleBar`] rows.

use crate::layout::{corrupt, write_atomic};
use chrono::{Datelike, NaiveDateTime};
use cyclebar_core::{Bar, CycleBar, RawBar, StoreError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Timestamp format written to base partitions
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Columns every base partition must carry
pub const BASE_COLUMNS: [&str; 7] = ["timestamp", "open", "high", "low", "close", "volume", "money"];

#[derive(Debug, Serialize, Deserialize)]
struct BaseRecord {
    timestamp: String,
    open: Option<f64>,
    high: Option<f64>,
    low: Option<f64>,
    close: Option<f64>,
    volume: Option<f64>,
    money: Option<f64>,
}

impl BaseRecord {
    fn from_bar(bar: &Bar) -> Self {
        Self {
            timestamp: bar.timestamp.format(TIMESTAMP_FORMAT).to_string(),
            open: Some(bar.open),
            high: Some(bar.high),
            low: Some(bar.low),
            close: Some(bar.close),
            volume: Some(bar.volume as f64),
            money: Some(bar.money as f64),
        }
    }

    fn into_raw(self) -> Result<RawBar, String> {
        let timestamp = parse_timestamp(&self.timestamp)?;
        // Vendors export volume and money as floats
        let count = |v: Option<f64>| v.filter(|v| v.is_finite()).map(|v| v.max(0.0).round() as u64);
        Ok(RawBar {
            timestamp,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: count(self.volume),
            money: count(self.money),
        })
    }
}

/// Accepts `2024-01-02 09:31:00`, `2024-01-02T09:31:00` and minute precision
pub fn parse_timestamp(text: &str) -> Result<NaiveDateTime, String> {
    const FORMATS: [&str; 4] = [
        TIMESTAMP_FORMAT,
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
    ];
    let text = text.trim();
    FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(text, f).ok())
        .ok_or_else(|| format!("unparseable timestamp '{text}'"))
}

pub fn read_base_partition(path: &Path) -> Result<Vec<RawBar>, StoreError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| corrupt(path, e))?;

    let headers = reader.headers().map_err(|e| corrupt(path, e))?.clone();
    if let Some(missing) = BASE_COLUMNS
        .iter()
        .find(|c| !headers.iter().any(|h| h == **c))
    {
        return Err(StoreError::MissingColumn {
            column: missing.to_string(),
            path: path.display().to_string(),
        });
    }

    let mut rows = Vec::new();
    // Line 1 is the header
    for (line, result) in reader.deserialize::<BaseRecord>().enumerate() {
        let record = result.map_err(|e| corrupt(path, format!("line {}: {e}", line + 2)))?;
        let raw = record
            .into_raw()
            .map_err(|e| corrupt(path, format!("line {}: {e}", line + 2)))?;
        rows.push(raw);
    }
    Ok(rows)
}

pub fn write_base_partition(path: &Path, bars: &[Bar]) -> Result<(), StoreError> {
    write_atomic(path, |tmp| {
        let mut writer = csv::Writer::from_path(tmp).map_err(|e| corrupt(tmp, e))?;
        for bar in bars {
            writer
                .serialize(BaseRecord::from_bar(bar))
                .map_err(|e| corrupt(tmp, e))?;
        }
        writer.flush()?;
        Ok(())
    })
}

pub fn read_derived_partition(path: &Path) -> Result<Vec<CycleBar>, StoreError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(|e| corrupt(path, e))?;
    reader
        .deserialize::<CycleBar>()
        .enumerate()
        .map(|(line, row)| row.map_err(|e| corrupt(path, format!("line {}: {e}", line + 2))))
        .collect()
}

pub fn write_derived_partition(path: &Path, bars: &[CycleBar]) -> Result<(), StoreError> {
    write_atomic(path, |tmp| {
        let mut writer = csv::Writer::from_path(tmp).map_err(|e| corrupt(tmp, e))?;
        for bar in bars {
            writer.serialize(bar).map_err(|e| corrupt(tmp, e))?;
        }
        writer.flush()?;
        Ok(())
    })
}

/// Group rows by calendar year of their timestamp, order kept within a year
pub fn by_year<T: Clone>(rows: &[T], timestamp: impl Fn(&T) -> NaiveDateTime) -> BTreeMap<i32, Vec<T>> {
    let mut groups: BTreeMap<i32, Vec<T>> = BTreeMap::new();
    for row in rows {
        groups
            .entry(timestamp(row).year())
            .or_default()
            .push(row.clone());
    }
    groups
}

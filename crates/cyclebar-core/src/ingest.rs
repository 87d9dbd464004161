//! Base-bar ingestion: ordering, de-duplication, fill and gap accounting

use crate::checkpoint::AnomalySummary;
use crate::errors::PipelineError;
use crate::session::is_intrablock_gap;
use crate::types::Bar;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Bar as read from a partition file; any value may be missing
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RawBar {
    pub timestamp: NaiveDateTime,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: Option<u64>,
    pub money: Option<u64>,
}

impl From<Bar> for RawBar {
    fn from(bar: Bar) -> Self {
        RawBar {
            timestamp: bar.timestamp,
            open: Some(bar.open),
            high: Some(bar.high),
            low: Some(bar.low),
            close: Some(bar.close),
            volume: Some(bar.volume),
            money: Some(bar.money),
        }
    }
}

/// Clean base bars plus what was repaired on the way
#[derive(Debug, Clone, Default)]
pub struct IngestReport {
    pub bars: Vec<Bar>,
    pub anomalies: AnomalySummary,
}

/// Turn raw rows into strictly increasing, fully populated bars
///
/// Rows are stably sorted, duplicate timestamps keep their first row, missing
/// prices take the previous bar's value for the same field, and missing
/// volume/money become zero. Leading rows whose prices cannot be filled are
/// dropped. Non-finite or non-positive prices are fatal.
pub fn sanitize(mut rows: Vec<RawBar>) -> Result<IngestReport, PipelineError> {
    let mut anomalies = AnomalySummary::default();
    rows.sort_by_key(|r| r.timestamp);

    let mut bars: Vec<Bar> = Vec::with_capacity(rows.len());
    let mut last_ts: Option<NaiveDateTime> = None;

    for row in rows {
        if last_ts == Some(row.timestamp) {
            anomalies.record_overlap();
            continue;
        }
        last_ts = Some(row.timestamp);

        let prev = bars.last();
        let fill = |value: Option<f64>, field: fn(&Bar) -> f64| value.or(prev.map(field));

        let (Some(open), Some(high), Some(low), Some(close)) = (
            fill(row.open, |b| b.open),
            fill(row.high, |b| b.high),
            fill(row.low, |b| b.low),
            fill(row.close, |b| b.close),
        ) else {
            anomalies.record_unfillable();
            debug!(timestamp = %row.timestamp, "dropping leading row without prices");
            continue;
        };

        let bar = Bar {
            timestamp: row.timestamp,
            open,
            high,
            low,
            close,
            volume: row.volume.unwrap_or(0),
            money: row.money.unwrap_or(0),
        };
        validate_bar(&bar)?;
        bars.push(bar);
    }

    count_gaps(&bars, &mut anomalies);
    Ok(IngestReport { bars, anomalies })
}

/// Same ordering/de-duplication/validation for already-typed bars
pub fn prepare(bars: Vec<Bar>) -> Result<IngestReport, PipelineError> {
    sanitize(bars.into_iter().map(RawBar::from).collect())
}

/// Reject prices that are non-finite or not strictly positive
pub fn validate_bar(bar: &Bar) -> Result<(), PipelineError> {
    for (name, value) in [
        ("open", bar.open),
        ("high", bar.high),
        ("low", bar.low),
        ("close", bar.close),
    ] {
        if !value.is_finite() || value <= 0.0 {
            return Err(PipelineError::InvalidBar {
                timestamp: bar.timestamp,
                reason: format!("{name}={value} must be finite and > 0"),
            });
        }
    }
    if bar.low > bar.high {
        return Err(PipelineError::InvalidBar {
            timestamp: bar.timestamp,
            reason: format!("low={} above high={}", bar.low, bar.high),
        });
    }
    Ok(())
}

/// Require strictly increasing timestamps
pub fn ensure_increasing(bars: &[Bar]) -> Result<(), PipelineError> {
    for (index, pair) in bars.windows(2).enumerate() {
        if pair[1].timestamp <= pair[0].timestamp {
            return Err(PipelineError::UnsortedBars {
                index: index + 1,
                prev: pair[0].timestamp,
                curr: pair[1].timestamp,
            });
        }
    }
    Ok(())
}

fn count_gaps(bars: &[Bar], anomalies: &mut AnomalySummary) {
    for pair in bars.windows(2) {
        if is_intrablock_gap(pair[0].timestamp, pair[1].timestamp) {
            anomalies.record_gap();
            warn!(
                from = %pair[0].timestamp,
                to = %pair[1].timestamp,
                "data gap in base bars"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn raw(h: u32, m: u32, close: Option<f64>, volume: Option<u64>) -> RawBar {
        RawBar {
            timestamp: ts(h, m),
            open: close,
            high: close,
            low: close,
            close,
            volume,
            money: volume,
        }
    }

    #[test]
    fn test_sort_dedup_and_fill() {
        let rows = vec![
            raw(9, 33, None, None),
            raw(9, 31, Some(10.0), Some(5)),
            raw(9, 32, Some(10.5), Some(7)),
            raw(9, 32, Some(99.0), Some(1)),
        ];
        let report = sanitize(rows).unwrap();
        assert_eq!(report.bars.len(), 3);
        assert_eq!(report.bars[1].close, 10.5);
        assert_eq!(report.bars[2].close, 10.5);
        assert_eq!(report.bars[2].volume, 0);
        assert_eq!(report.anomalies.overlaps_detected, 1);
        assert!(ensure_increasing(&report.bars).is_ok());
    }

    #[test]
    fn test_leading_unfillable_rows_dropped() {
        let rows = vec![raw(9, 31, None, Some(3)), raw(9, 32, Some(10.0), Some(5))];
        let report = sanitize(rows).unwrap();
        assert_eq!(report.bars.len(), 1);
        assert_eq!(report.anomalies.unfillable_rows, 1);
    }

    #[test]
    fn test_gap_counted_not_fatal() {
        let rows = vec![
            raw(9, 31, Some(10.0), Some(5)),
            raw(9, 40, Some(10.0), Some(5)),
            raw(11, 30, Some(10.0), Some(5)),
            raw(13, 1, Some(10.0), Some(5)),
        ];
        let report = sanitize(rows).unwrap();
        // 09:31→09:40 and 09:40→11:30 are gaps, lunch is not
        assert_eq!(report.anomalies.gaps_detected, 2);
        assert_eq!(report.bars.len(), 4);
    }

    #[test]
    fn test_non_positive_price_is_fatal() {
        let rows = vec![raw(9, 31, Some(0.0), Some(5))];
        assert!(matches!(
            sanitize(rows),
            Err(PipelineError::InvalidBar { .. })
        ));
    }

    #[test]
    fn test_unsorted_detected() {
        let a = Bar {
            timestamp: ts(9, 32),
            open: 1.0,
            high: 1.0,
            low: 1.0,
            close: 1.0,
            volume: 0,
            money: 0,
        };
        let b = Bar {
            timestamp: ts(9, 31),
            ..a
        };
        assert!(matches!(
            ensure_increasing(&[a, b]),
            Err(PipelineError::UnsortedBars { index: 1, .. })
        ));
    }
}

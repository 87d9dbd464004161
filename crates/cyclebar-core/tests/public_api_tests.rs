//! Scenario tests through the public API only

use chrono::{NaiveDate, NaiveDateTime};
use cyclebar_core::ingest::{sanitize, RawBar};
use cyclebar_core::{
    Bar, Checkpoint, Column, Direction, FeatureFrame, MatrixBuilder, MatrixShape, ModelSpec,
    ParameterStore, Period, PipelineError, Resampler, ScaleBounds, StoredBounds,
};
use std::collections::BTreeMap;

fn at(day: u32, hour: u32, minute: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, day)
        .unwrap()
        .and_hms_opt(hour, minute, 0)
        .unwrap()
}

fn bar(timestamp: NaiveDateTime, close: f64, volume: u64) -> Bar {
    Bar {
        timestamp,
        open: close,
        high: close + 0.1,
        low: close - 0.1,
        close,
        volume,
        money: volume * 10,
    }
}

#[test]
fn test_messy_partition_rows_are_repaired() {
    let rows = vec![
        RawBar {
            timestamp: at(4, 9, 32),
            close: Some(10.2),
            ..RawBar::default()
        },
        RawBar {
            timestamp: at(4, 9, 31),
            open: Some(10.0),
            high: Some(10.3),
            low: Some(9.9),
            close: Some(10.1),
            volume: Some(300),
            money: Some(3030),
        },
        RawBar::from(bar(at(4, 9, 31), 99.0, 1)),
        RawBar::from(bar(at(4, 9, 40), 10.4, 200)),
    ];

    let report = sanitize(rows).unwrap();
    assert_eq!(report.bars.len(), 3);
    assert_eq!(report.bars[0].close, 10.1);
    // 09:32 keeps its close and inherits the other prices
    assert_eq!(report.bars[1].close, 10.2);
    assert_eq!(report.bars[1].high, 10.3);
    assert_eq!(report.bars[1].volume, 0);
    assert_eq!(report.anomalies.overlaps_detected, 1);
    assert_eq!(report.anomalies.gaps_detected, 1);
}

#[test]
fn test_non_positive_price_is_fatal() {
    let rows = vec![RawBar::from(bar(at(4, 9, 31), 0.0, 10))];
    assert!(matches!(
        sanitize(rows),
        Err(PipelineError::InvalidBar { .. })
    ));
}

#[test]
fn test_hourly_resample_respects_lunch_break() {
    let mut bars = Vec::new();
    for minute in (9 * 60 + 31)..=(11 * 60 + 30) {
        bars.push(bar(at(5, minute / 60, minute % 60), 10.0, 1));
    }
    for minute in (13 * 60 + 1)..=(15 * 60) {
        bars.push(bar(at(5, minute / 60, minute % 60), 11.0, 2));
    }

    let period: Period = "60m".parse().unwrap();
    let hourly = Resampler::new(period).resample(&bars).unwrap();
    let labels: Vec<NaiveDateTime> = hourly.iter().map(|b| b.timestamp).collect();
    assert_eq!(
        labels,
        vec![at(5, 10, 30), at(5, 11, 30), at(5, 14, 0), at(5, 15, 0)]
    );
    assert!(hourly.iter().all(|b| b.volume == 60 || b.volume == 120));
}

#[test]
fn test_legacy_checkpoint_record_loads() {
    let json = r#"{
        "RecordEndDate": "2024-03-05T15:00:00",
        "RecordEndSignal": "Downturn",
        "RecordEndSignalTimes": 202403051330,
        "RecordEndSignalStartTime": "2024-03-05T13:30:00",
        "RecordNextStartDate": "2024-02-20T10:15:00"
    }"#;
    let checkpoint: Checkpoint = serde_json::from_str(json).unwrap();
    assert_eq!(checkpoint.end_signal, Direction::Downturn);
    assert!(checkpoint.emitted.is_empty());
    assert!(checkpoint.validate().is_ok());
}

#[test]
fn test_bounds_only_widen() {
    let mut store: BTreeMap<String, StoredBounds> = BTreeMap::new();
    store
        .merge_and_put("amplitude", StoredBounds::Range(ScaleBounds::new(0.0, 100.0)))
        .unwrap();
    let merged = store
        .merge_and_put("amplitude", StoredBounds::Range(ScaleBounds::new(10.0, 90.0)))
        .unwrap();
    assert_eq!(merged, StoredBounds::Range(ScaleBounds::new(0.0, 100.0)));

    let merged = store
        .merge_and_put("amplitude", StoredBounds::Range(ScaleBounds::new(-5.0, 80.0)))
        .unwrap();
    assert_eq!(merged, StoredBounds::Range(ScaleBounds::new(-5.0, 100.0)));
}

#[test]
fn test_empty_frame_yields_empty_matrix() {
    let frame = FeatureFrame::from_cycle_bars(&[]);
    let builder = MatrixBuilder::new(MatrixShape::default()).unwrap();
    let spec = ModelSpec::new("bar_change", vec![Column::Position], vec![Column::Amplitude]);
    let matrix = builder.build(&frame, &spec).unwrap();
    assert!(matrix.is_empty());
    assert_eq!(matrix.x.shape(), &[0, 30, 30, 1]);
    assert_eq!(matrix.y.shape(), &[0, 1]);
}

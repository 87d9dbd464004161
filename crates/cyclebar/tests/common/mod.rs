//! Shared fixtures for the cross-crate suites

#![allow(dead_code)]

use chrono::NaiveDateTime;
use cyclebar::core::session::midnight;
use cyclebar::core::test_utils::{swing_series, trading_day, SwingConfig};
use cyclebar::{Bar, SeriesKey};

pub const SYMBOL: &str = "000001.XSHE";

pub fn key() -> SeriesKey {
    SeriesKey::new(SYMBOL, "15m")
}

pub fn swing(days: u32, seed: u64) -> Vec<Bar> {
    swing_series(&SwingConfig {
        days,
        seed,
        ..SwingConfig::default()
    })
}

/// Bars before trading day `day`, and the rest
pub fn split_at_day(bars: Vec<Bar>, day: u32) -> (Vec<Bar>, Vec<Bar>) {
    let cut = midnight(trading_day(day));
    bars.into_iter().partition(|b| b.timestamp < cut)
}

/// Bars from trading day `from` (inclusive) to `to` (exclusive)
pub fn days_between(bars: &[Bar], from: u32, to: u32) -> Vec<Bar> {
    let (start, end) = (midnight(trading_day(from)), midnight(trading_day(to)));
    bars.iter()
        .filter(|b| b.timestamp >= start && b.timestamp < end)
        .copied()
        .collect()
}

pub fn assert_strictly_increasing<T>(items: &[T], timestamp: impl Fn(&T) -> NaiveDateTime) {
    for (i, pair) in items.windows(2).enumerate() {
        assert!(
            timestamp(&pair[0]) < timestamp(&pair[1]),
            "not strictly increasing at {}: {} then {}",
            i + 1,
            timestamp(&pair[0]),
            timestamp(&pair[1])
        );
    }
}

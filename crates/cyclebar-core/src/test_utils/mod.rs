//! Test utilities for consistent test data creation across the codebase
//!
//! ## Module Organization
//!
//! - `mod.rs`: calendar helpers and small bar builders
//! - `generators.rs`: multi-day synthetic swing series for integration tests
//! - `memory.rs`: in-memory implementation of every store trait

pub mod generators;
pub mod memory;

pub use generators::{swing_series, SwingConfig};
pub use memory::MemoryStore;

use crate::session::{AFTERNOON_CLOSE, AFTERNOON_OPEN, MORNING_CLOSE, MORNING_OPEN};
use crate::types::Bar;
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Weekday};

/// First trading day used by all generators (a Tuesday)
pub fn base_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()
}

/// The `n`-th weekday on or after [`base_date`]
pub fn trading_day(n: u32) -> NaiveDate {
    let mut date = base_date();
    let mut remaining = n;
    loop {
        if !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
            if remaining == 0 {
                return date;
            }
            remaining -= 1;
        }
        date += Duration::days(1);
    }
}

pub fn ts(date: NaiveDate, hour: u32, minute: u32) -> NaiveDateTime {
    date.and_hms_opt(hour, minute, 0).unwrap()
}

/// Flat bar: open = high = low = close = `price`
pub fn bar_at(timestamp: NaiveDateTime, price: f64, volume: u64) -> Bar {
    Bar {
        timestamp,
        open: price,
        high: price,
        low: price,
        close: price,
        volume,
        money: (volume as f64 * price) as u64,
    }
}

/// The 240 one-minute labels of a session: 09:31-11:30 and 13:01-15:00
pub fn trading_minutes(date: NaiveDate) -> Vec<NaiveDateTime> {
    let midnight = date.and_hms_opt(0, 0, 0).unwrap();
    (MORNING_OPEN + 1..=MORNING_CLOSE)
        .chain(AFTERNOON_OPEN + 1..=AFTERNOON_CLOSE)
        .map(|m| midnight + Duration::minutes(i64::from(m)))
        .collect()
}

/// One full session of flat bars
pub fn flat_session_day(date: NaiveDate, price: f64, volume: u64) -> Vec<Bar> {
    trading_minutes(date)
        .into_iter()
        .map(|t| bar_at(t, price, volume))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trading_days_skip_weekends() {
        assert_eq!(trading_day(0), base_date());
        // 2024-01-06/07 is a weekend
        assert_eq!(trading_day(4), NaiveDate::from_ymd_opt(2024, 1, 8).unwrap());
        assert_eq!(trading_minutes(base_date()).len(), 240);
    }
}

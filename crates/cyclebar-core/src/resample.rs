//! Period resampling of base bars
//!
//! Buckets are right-closed and right-labelled: a bar labelled T covers (T - N, T].
//! Intraday buckets are anchored at midnight, except 60m/120m which restart at each
//! session block open so no output bar bridges the lunch break; a print at or
//! before a block open folds into that block's first bucket. Daily bars group
//! by calendar date and are labelled at midnight. Empty buckets are omitted.

use crate::errors::PipelineError;
use crate::ingest::ensure_increasing;
use crate::session::{midnight, minute_of_day, SessionBlock};
use crate::types::{Bar, Period};
use chrono::{Duration, NaiveDateTime};
use tracing::debug;

/// Stateless N-minute/daily aggregator
#[derive(Debug, Clone, Copy)]
pub struct Resampler {
    period: Period,
}

impl Resampler {
    pub fn new(period: Period) -> Self {
        Self { period }
    }

    pub fn period(&self) -> Period {
        self.period
    }

    /// Aggregate strictly increasing bars into period bars
    ///
    /// open = first open, close = last close, high = max, low = min,
    /// volume and money are summed.
    pub fn resample(&self, bars: &[Bar]) -> Result<Vec<Bar>, PipelineError> {
        ensure_increasing(bars)?;

        let mut out: Vec<Bar> = Vec::new();
        let mut current: Option<(NaiveDateTime, BarAccumulator)> = None;

        for bar in bars {
            let label = self.bucket_label(bar.timestamp);
            match current.as_mut() {
                Some((open_label, acc)) if *open_label == label => acc.push(bar),
                _ => {
                    if let Some((done_label, acc)) = current.take() {
                        out.push(acc.finish(done_label));
                    }
                    current = Some((label, BarAccumulator::start(bar)));
                }
            }
        }
        if let Some((label, acc)) = current {
            out.push(acc.finish(label));
        }

        // Block-anchored labels can interleave with the other block's
        out.sort_by_key(|b| b.timestamp);
        debug!(
            period = %self.period,
            input = bars.len(),
            output = out.len(),
            "resampled bars"
        );
        Ok(out)
    }

    /// Right label of the bucket containing `ts`
    pub fn bucket_label(&self, ts: NaiveDateTime) -> NaiveDateTime {
        let day = midnight(ts.date());
        let n = match self.period {
            Period::Daily => return day,
            Period::Minutes(n) => i64::from(n),
        };

        let delta = |anchor: i64| i64::from(minute_of_day(ts)) - anchor;
        let offset = if self.period.splits_session() {
            let anchor = i64::from(SessionBlock::of(ts).open_minute());
            anchor + ceil_div(delta(anchor), n).max(1) * n
        } else {
            ceil_div(delta(0), n) * n
        };
        day + Duration::minutes(offset)
    }
}

/// Ceiling division that also rounds negative numerators toward +inf
#[inline]
fn ceil_div(a: i64, b: i64) -> i64 {
    -((-a).div_euclid(b))
}

/// Running OHLCV aggregate for one bucket
#[derive(Debug, Clone, Copy)]
struct BarAccumulator {
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: u64,
    money: u64,
}

impl BarAccumulator {
    fn start(bar: &Bar) -> Self {
        Self {
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            volume: bar.volume,
            money: bar.money,
        }
    }

    fn push(&mut self, bar: &Bar) {
        self.high = self.high.max(bar.high);
        self.low = self.low.min(bar.low);
        self.close = bar.close;
        self.volume = self.volume.saturating_add(bar.volume);
        self.money = self.money.saturating_add(bar.money);
    }

    fn finish(self, timestamp: NaiveDateTime) -> Bar {
        Bar {
            timestamp,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
            money: self.money,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{flat_session_day, trading_day, ts};
    use chrono::Timelike;

    #[test]
    fn test_ceil_div() {
        assert_eq!(ceil_div(1, 15), 1);
        assert_eq!(ceil_div(15, 15), 1);
        assert_eq!(ceil_div(16, 15), 2);
        assert_eq!(ceil_div(0, 60), 0);
        assert_eq!(ceil_div(-5, 60), 0);
        assert_eq!(ceil_div(-65, 60), -1);
    }

    #[test]
    fn test_fifteen_minute_day() {
        let bars = flat_session_day(trading_day(0), 10.0, 100);
        assert_eq!(bars.len(), 240);

        let out = Resampler::new(Period::Minutes(15)).resample(&bars).unwrap();
        assert_eq!(out.len(), 16);
        for bar in &out {
            assert_eq!(bar.open, 10.0);
            assert_eq!(bar.high, 10.0);
            assert_eq!(bar.low, 10.0);
            assert_eq!(bar.close, 10.0);
            assert_eq!(bar.volume, 1500);
        }
        assert_eq!(out[0].timestamp.time().hour(), 9);
        assert_eq!(out[0].timestamp.time().minute(), 45);
    }

    #[test]
    fn test_hourly_labels_follow_session_blocks() {
        let bars = flat_session_day(trading_day(0), 10.0, 1);
        let hourly = Resampler::new(Period::Minutes(60)).resample(&bars).unwrap();
        let labels: Vec<(u32, u32)> = hourly
            .iter()
            .map(|b| (b.timestamp.hour(), b.timestamp.minute()))
            .collect();
        assert_eq!(labels, vec![(10, 30), (11, 30), (14, 0), (15, 0)]);
        assert!(hourly.iter().all(|b| b.volume == 60));

        let two_hour = Resampler::new(Period::Minutes(120)).resample(&bars).unwrap();
        assert_eq!(two_hour.len(), 2);
        assert!(two_hour.iter().all(|b| b.volume == 120));
    }

    #[test]
    fn test_block_open_print_joins_first_bucket() {
        let hourly = Resampler::new(Period::Minutes(60));
        let day = trading_day(0);
        assert_eq!(hourly.bucket_label(ts(day, 13, 0)), ts(day, 14, 0));
        assert_eq!(hourly.bucket_label(ts(day, 13, 1)), ts(day, 14, 0));
        assert_eq!(hourly.bucket_label(ts(day, 9, 30)), ts(day, 10, 30));
        assert_eq!(hourly.bucket_label(ts(day, 9, 25)), ts(day, 10, 30));
        assert_eq!(hourly.bucket_label(ts(day, 14, 0)), ts(day, 14, 0));

        let two_hour = Resampler::new(Period::Minutes(120));
        assert_eq!(two_hour.bucket_label(ts(day, 13, 0)), ts(day, 15, 0));

        // Right-closed buckets elsewhere keep the open print on its own
        let quarter = Resampler::new(Period::Minutes(15));
        assert_eq!(quarter.bucket_label(ts(day, 13, 0)), ts(day, 13, 0));

        let mut bars = flat_session_day(day, 10.0, 1);
        let print = Bar {
            timestamp: ts(day, 13, 0),
            ..bars[120]
        };
        bars.insert(120, print);
        let out = hourly.resample(&bars).unwrap();
        assert_eq!(out.len(), 4);
        assert_eq!(out[2].timestamp, ts(day, 14, 0));
        assert_eq!(out[2].volume, 61);

        // Already hourly bars keep their labels
        let again = hourly.resample(&out).unwrap();
        assert_eq!(again, out);
    }

    #[test]
    fn test_daily_groups_by_date() {
        let mut bars = flat_session_day(trading_day(0), 10.0, 2);
        bars.extend(flat_session_day(trading_day(1), 11.0, 3));
        let daily = Resampler::new(Period::Daily).resample(&bars).unwrap();
        assert_eq!(daily.len(), 2);
        assert_eq!(daily[0].volume, 480);
        assert_eq!(daily[1].volume, 720);
        assert_eq!(daily[1].timestamp, midnight(trading_day(1)));
    }

    #[test]
    fn test_ohlc_aggregation() {
        let mk = |m: u32, o: f64, h: f64, l: f64, c: f64| Bar {
            timestamp: ts(trading_day(0), 9, m),
            open: o,
            high: h,
            low: l,
            close: c,
            volume: 1,
            money: 10,
        };
        let bars = vec![
            mk(31, 10.0, 10.5, 9.9, 10.2),
            mk(32, 10.2, 11.0, 10.1, 10.9),
            mk(33, 10.9, 10.9, 9.5, 9.7),
        ];
        let out = Resampler::new(Period::Minutes(15)).resample(&bars).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].open, 10.0);
        assert_eq!(out[0].high, 11.0);
        assert_eq!(out[0].low, 9.5);
        assert_eq!(out[0].close, 9.7);
        assert_eq!(out[0].volume, 3);
        assert_eq!(out[0].money, 30);
    }

    #[test]
    fn test_unsorted_input_rejected() {
        let mut bars = flat_session_day(trading_day(0), 10.0, 1);
        bars.swap(3, 4);
        assert!(matches!(
            Resampler::new(Period::Minutes(15)).resample(&bars),
            Err(PipelineError::UnsortedBars { .. })
        ));
    }
}

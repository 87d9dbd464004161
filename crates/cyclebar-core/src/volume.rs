//! Volume peak helpers over the base-bar stream

use crate::session::midnight;
use crate::types::Bar;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap};

/// Mean of the `n` largest volumes (fewer if fewer are available)
///
/// `None` for an empty input or `n == 0`.
pub fn top_mean(volumes: impl IntoIterator<Item = u64>, n: usize) -> Option<f64> {
    if n == 0 {
        return None;
    }
    // min-heap holding the n largest seen so far
    let mut heap: BinaryHeap<Reverse<u64>> = BinaryHeap::with_capacity(n + 1);
    for v in volumes {
        heap.push(Reverse(v));
        if heap.len() > n {
            heap.pop();
        }
    }
    if heap.is_empty() {
        return None;
    }
    let count = heap.len() as f64;
    Some(heap.into_iter().map(|Reverse(v)| v as f64).sum::<f64>() / count)
}

/// Sorted base bars with time-window lookups
#[derive(Debug, Clone, Copy)]
pub struct BaseIndex<'a> {
    bars: &'a [Bar],
}

impl<'a> BaseIndex<'a> {
    /// `bars` must be strictly increasing in time
    pub fn new(bars: &'a [Bar]) -> Self {
        Self { bars }
    }

    /// Bars with `from <= timestamp <= to`
    pub fn closed(&self, from: NaiveDateTime, to: NaiveDateTime) -> &'a [Bar] {
        let lo = self.bars.partition_point(|b| b.timestamp < from);
        let hi = self.bars.partition_point(|b| b.timestamp <= to);
        &self.bars[lo..hi.max(lo)]
    }

    /// Bars with `from < timestamp < to`
    pub fn open(&self, from: NaiveDateTime, to: NaiveDateTime) -> &'a [Bar] {
        let lo = self.bars.partition_point(|b| b.timestamp <= from);
        let hi = self.bars.partition_point(|b| b.timestamp < to);
        &self.bars[lo..hi.max(lo)]
    }

    /// Trailing look-back window `(at - minutes, at)`
    pub fn trailing(&self, at: NaiveDateTime, minutes: i64) -> &'a [Bar] {
        self.open(at - Duration::minutes(minutes), at)
    }

    /// Peak-1/5/15 of every trading date's base bars
    pub fn session_peaks(&self) -> BTreeMap<NaiveDate, SessionPeaks> {
        let mut out = BTreeMap::new();
        let mut rest = self.bars;
        while let Some(first) = rest.first() {
            let date = first.timestamp.date();
            let next_day = midnight(date) + Duration::days(1);
            let split = rest.partition_point(|b| b.timestamp < next_day);
            let (day, tail) = rest.split_at(split);
            out.insert(date, SessionPeaks::of(day));
            rest = tail;
        }
        out
    }
}

/// Volume peaks of one whole trading session
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SessionPeaks {
    pub peak1: Option<f64>,
    pub peak5: Option<f64>,
    pub peak15: Option<f64>,
}

impl SessionPeaks {
    pub fn of(bars: &[Bar]) -> Self {
        let volumes = || bars.iter().map(|b| b.volume);
        Self {
            peak1: top_mean(volumes(), 1),
            peak5: top_mean(volumes(), 5),
            peak15: top_mean(volumes(), 15),
        }
    }
}

//! Reversal signal detection
//!
//! 1. Histogram crossings mark candidates one bar after the sign change.
//! 2. Each candidate's span runs to the next candidate.
//! 3. Spans with fewer than `min_swing_bars` direction-consistent bars are discarded.
//! 4. A surviving candidate repeating the previous survivor's direction is discarded.
//! 5. Survivors tag every bar up to the next survivor with an explicit [`CycleId`].
//!
//! Fewer than two survivors means no cycles: the series comes back untagged.

use crate::bollinger::{Bollinger, BollingerBand};
use crate::errors::PipelineError;
use crate::oscillator::{Oscillator, OscillatorParams, OscillatorPoint};
use crate::types::{Bar, CycleId, Direction};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Detector settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalParams {
    pub oscillator: OscillatorParams,
    /// Minimum direction-consistent bars for a candidate to survive
    pub min_swing_bars: usize,
    /// Closes averaged by the Bollinger mid line
    pub bollinger_window: usize,
}

impl Default for SignalParams {
    fn default() -> Self {
        Self {
            oscillator: OscillatorParams::default(),
            min_swing_bars: 7,
            bollinger_window: 20,
        }
    }
}

/// Cycle membership of one bar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleTag {
    pub id: CycleId,
    pub direction: Direction,
    /// Index of the cycle's signal bar in the series
    pub start_index: usize,
    pub start_time: NaiveDateTime,
}

/// Bar annotated with oscillator values and cycle membership
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalBar {
    pub bar: Bar,
    pub oscillator: OscillatorPoint,
    pub bands: BollingerBand,
    /// Set only on the bar where a surviving signal fires
    pub marker: Option<Direction>,
    /// `None` before the first surviving signal
    pub cycle: Option<CycleTag>,
}

/// Detector output aligned with the input bars
#[derive(Debug, Clone, Default)]
pub struct SignalSeries {
    pub bars: Vec<SignalBar>,
}

impl SignalSeries {
    /// Surviving signals as (index, direction)
    pub fn signals(&self) -> impl Iterator<Item = (usize, Direction)> + '_ {
        self.bars
            .iter()
            .enumerate()
            .filter_map(|(i, b)| b.marker.map(|d| (i, d)))
    }

    pub fn has_cycles(&self) -> bool {
        self.signals().nth(1).is_some()
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }
}

/// Reversal detector
#[derive(Debug, Clone, Copy)]
pub struct SignalDetector {
    params: SignalParams,
    oscillator: Oscillator,
    bollinger: Bollinger,
}

impl SignalDetector {
    pub fn new(params: SignalParams) -> Result<Self, PipelineError> {
        if params.min_swing_bars == 0 {
            return Err(PipelineError::invalid_parameter(
                "min_swing_bars",
                "must be at least 1",
            ));
        }
        Ok(Self {
            params,
            oscillator: Oscillator::new(params.oscillator)?,
            bollinger: Bollinger::new(params.bollinger_window)?,
        })
    }

    /// Compute the oscillator over closes and detect cycles
    pub fn detect(&self, bars: &[Bar]) -> Result<SignalSeries, PipelineError> {
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let points = self.oscillator.compute(&closes);
        self.detect_from_oscillator(bars, &points)
    }

    /// Detect cycles from precomputed oscillator values
    pub fn detect_from_oscillator(
        &self,
        bars: &[Bar],
        points: &[OscillatorPoint],
    ) -> Result<SignalSeries, PipelineError> {
        if bars.len() != points.len() {
            return Err(PipelineError::invalid_parameter(
                "oscillator",
                format!("{} points for {} bars", points.len(), bars.len()),
            ));
        }

        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let bands = self.bollinger.compute(&closes);
        let hist: Vec<f64> = points.iter().map(|p| p.hist).collect();
        let candidates = crossing_candidates(&hist);
        let validated = self.validate_swings(&candidates, points);
        let survivors = alternate(&validated);

        let mut series = SignalSeries {
            bars: bars
                .iter()
                .zip(points)
                .zip(bands)
                .map(|((bar, oscillator), bands)| SignalBar {
                    bar: *bar,
                    oscillator: *oscillator,
                    bands,
                    marker: None,
                    cycle: None,
                })
                .collect(),
        };

        if survivors.len() < 2 {
            debug!(
                candidates = candidates.iter().flatten().count(),
                survivors = survivors.len(),
                "no cycles detected"
            );
            return Ok(series);
        }

        for (n, &(start, direction)) in survivors.iter().enumerate() {
            let end = survivors.get(n + 1).map_or(bars.len(), |&(next, _)| next);
            let start_time = bars[start].timestamp;
            let tag = CycleTag {
                id: CycleId::from_start(start_time),
                direction,
                start_index: start,
                start_time,
            };
            series.bars[start].marker = Some(direction);
            for signal_bar in &mut series.bars[start..end] {
                signal_bar.cycle = Some(tag);
            }
        }

        debug!(
            candidates = candidates.iter().flatten().count(),
            survivors = survivors.len(),
            "signals detected"
        );
        Ok(series)
    }

    /// Drop candidates whose span lacks enough direction-consistent bars
    fn validate_swings(
        &self,
        candidates: &[Option<Direction>],
        points: &[OscillatorPoint],
    ) -> Vec<(usize, Direction)> {
        let starts: Vec<(usize, Direction)> = candidates
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.map(|d| (i, d)))
            .collect();

        starts
            .iter()
            .enumerate()
            .filter(|&(n, &(start, direction))| {
                let end = starts.get(n + 1).map_or(points.len(), |&(next, _)| next);
                let consistent = points[start..end]
                    .iter()
                    .filter(|p| swings_with(p, direction))
                    .count();
                consistent >= self.params.min_swing_bars
            })
            .map(|(_, &candidate)| candidate)
            .collect()
    }
}

/// Candidate directions from histogram sign changes
///
/// Downturn at `i + 1` when `hist[i] > 0 && hist[i + 1] <= 0`;
/// upturn at `i + 1` when `hist[i] < 0 && hist[i + 1] >= 0`.
pub fn crossing_candidates(hist: &[f64]) -> Vec<Option<Direction>> {
    let mut out = vec![None; hist.len()];
    for i in 1..hist.len() {
        let (prev, curr) = (hist[i - 1], hist[i]);
        if prev > 0.0 && curr <= 0.0 {
            out[i] = Some(Direction::Downturn);
        } else if prev < 0.0 && curr >= 0.0 {
            out[i] = Some(Direction::Upturn);
        }
    }
    out
}

#[inline]
fn swings_with(point: &OscillatorPoint, direction: Direction) -> bool {
    match direction {
        Direction::Upturn => point.diff_ml > 0.0 && point.diff_sm > 0.0,
        Direction::Downturn => point.diff_ml < 0.0 && point.diff_sm < 0.0,
    }
}

/// Keep only candidates whose direction differs from the previous survivor
fn alternate(candidates: &[(usize, Direction)]) -> Vec<(usize, Direction)> {
    let mut out: Vec<(usize, Direction)> = Vec::with_capacity(candidates.len());
    for &(index, direction) in candidates {
        if out.last().map(|&(_, d)| d) != Some(direction) {
            out.push((index, direction));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{bar_at, trading_day, ts};
    use chrono::Duration;

    fn flat_bars(n: usize) -> Vec<Bar> {
        let start = ts(trading_day(0), 9, 45);
        (0..n)
            .map(|i| bar_at(start + Duration::minutes(15 * i as i64), 10.0, 100))
            .collect()
    }

    fn points(hist: &[f64], consistent: impl Fn(usize) -> (f64, f64)) -> Vec<OscillatorPoint> {
        hist.iter()
            .enumerate()
            .map(|(i, &h)| {
                let (sm, ml) = consistent(i);
                OscillatorPoint::from_parts(sm, ml, h)
            })
            .collect()
    }

    #[test]
    fn test_crossing_marks_next_bar() {
        let mut hist = vec![1.0; 100];
        for h in hist.iter_mut().skip(51) {
            *h = -1.0;
        }
        let candidates = crossing_candidates(&hist);
        assert_eq!(candidates[51], Some(Direction::Downturn));
        assert_eq!(candidates.iter().flatten().count(), 1);
    }

    #[test]
    fn test_zero_histogram_counts_as_crossing() {
        let candidates = crossing_candidates(&[-0.5, 0.0, 0.3, 0.0]);
        assert_eq!(
            candidates,
            vec![None, Some(Direction::Upturn), None, Some(Direction::Downturn)]
        );
    }

    #[test]
    fn test_weak_swing_discarded() {
        // up at 10, down at 51 (weak), up at 60, down at 80
        let hist: Vec<f64> = (0..110)
            .map(|i| {
                if i < 10 || (51..60).contains(&i) || i >= 80 {
                    -1.0
                } else {
                    1.0
                }
            })
            .collect();
        assert_eq!(crossing_candidates(&hist)[51], Some(Direction::Downturn));

        // only 3 bars from 51 have both spreads negative
        let pts = points(&hist, |i| match i {
            51..=53 => (-1.0, -1.0),
            54..=59 => (1.0, -1.0),
            80.. => (-1.0, -1.0),
            _ => (1.0, 1.0),
        });
        let detector = SignalDetector::new(SignalParams::default()).unwrap();
        let series = detector
            .detect_from_oscillator(&flat_bars(110), &pts)
            .unwrap();

        assert!(series.bars[51].marker.is_none());
        assert_eq!(series.bars[51].cycle.unwrap().start_index, 10);
        // the up candidate at 60 now repeats the direction of 10
        let signals: Vec<(usize, Direction)> = series.signals().collect();
        assert_eq!(
            signals,
            vec![(10, Direction::Upturn), (80, Direction::Downturn)]
        );
    }

    #[test]
    fn test_single_survivor_means_no_cycles() {
        let mut hist = vec![1.0; 100];
        for h in hist.iter_mut().skip(51) {
            *h = -1.0;
        }
        let pts = points(&hist, |_| (-1.0, -1.0));
        let detector = SignalDetector::new(SignalParams::default()).unwrap();
        let series = detector
            .detect_from_oscillator(&flat_bars(100), &pts)
            .unwrap();
        assert!(series.bars.iter().all(|b| b.cycle.is_none()));
        assert!(!series.has_cycles());
    }

    #[test]
    fn test_alternating_swings_tag_cycles() {
        // down at 20, up at 50, down at 80
        let hist: Vec<f64> = (0..110)
            .map(|i| if i < 20 || (50..80).contains(&i) { 1.0 } else { -1.0 })
            .collect();
        let pts = points(&hist, |i| {
            if (20..50).contains(&i) || i >= 80 {
                (-1.0, -1.0)
            } else {
                (1.0, 1.0)
            }
        });
        let bars = flat_bars(110);
        let detector = SignalDetector::new(SignalParams::default()).unwrap();
        let series = detector.detect_from_oscillator(&bars, &pts).unwrap();

        let signals: Vec<(usize, Direction)> = series.signals().collect();
        assert_eq!(
            signals,
            vec![
                (20, Direction::Downturn),
                (50, Direction::Upturn),
                (80, Direction::Downturn)
            ]
        );
        assert!(series.bars[19].cycle.is_none());
        let tag = series.bars[65].cycle.unwrap();
        assert_eq!(tag.start_index, 50);
        assert_eq!(tag.id, CycleId::from_start(bars[50].timestamp));
        assert_eq!(series.bars[109].cycle.unwrap().start_index, 80);
    }

    #[test]
    fn test_repeated_direction_dropped() {
        // down at 20, a weak up at 40 (discarded), down again at 45
        let hist: Vec<f64> = (0..100)
            .map(|i| {
                if i < 20 || (40..45).contains(&i) || (70..).contains(&i) {
                    1.0
                } else {
                    -1.0
                }
            })
            .collect();
        let pts = points(&hist, |i| {
            if (40..45).contains(&i) || i >= 70 {
                (1.0, 1.0)
            } else {
                (-1.0, -1.0)
            }
        });
        let detector = SignalDetector::new(SignalParams::default()).unwrap();
        let series = detector
            .detect_from_oscillator(&flat_bars(100), &pts)
            .unwrap();
        let signals: Vec<(usize, Direction)> = series.signals().collect();
        assert_eq!(
            signals,
            vec![(20, Direction::Downturn), (70, Direction::Upturn)]
        );
        assert_eq!(series.bars[60].cycle.unwrap().start_index, 20);
    }

    #[test]
    fn test_bands_follow_closes() {
        let mut bars = flat_bars(30);
        bars[29].close = 12.0;
        let pts = points(&[1.0; 30], |_| (1.0, 1.0));
        let detector = SignalDetector::new(SignalParams::default()).unwrap();
        let series = detector.detect_from_oscillator(&bars, &pts).unwrap();

        assert_eq!(series.bars[0].bands.mid, 10.0);
        assert!(series.bars[0].bands.stop_loss.is_none());
        assert_eq!(series.bars[28].bands.std, Some(0.0));
        let last = series.bars[29].bands;
        assert!(last.mid > 10.0);
        assert!(last.up.unwrap() > 12.0);
        assert!(last.stop_loss.unwrap() < last.dn.unwrap());
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let detector = SignalDetector::new(SignalParams::default()).unwrap();
        let result = detector.detect_from_oscillator(&flat_bars(3), &[]);
        assert!(matches!(
            result,
            Err(PipelineError::InvalidParameter { .. })
        ));
    }
}

//! Three-average momentum oscillator
//!
//! `diff = sma_short - sma_long`, `diff_sm = sma_short - sma_mid`,
//! `diff_ml = sma_mid - sma_long`, `dea = sma(diff, signal)`,
//! `hist = (diff - dea) * 2`.

use crate::errors::PipelineError;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Moving-average windows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OscillatorParams {
    pub short: usize,
    pub mid: usize,
    pub long: usize,
    /// Window of the `dea` signal line
    pub signal: usize,
}

impl Default for OscillatorParams {
    fn default() -> Self {
        Self {
            short: 12,
            mid: 20,
            long: 30,
            signal: 9,
        }
    }
}

impl OscillatorParams {
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.short == 0 || self.signal == 0 {
            return Err(PipelineError::invalid_parameter(
                "oscillator",
                "windows must be non-zero",
            ));
        }
        if !(self.short < self.mid && self.mid < self.long) {
            return Err(PipelineError::invalid_parameter(
                "oscillator",
                format!(
                    "expected short < mid < long, got {}/{}/{}",
                    self.short, self.mid, self.long
                ),
            ));
        }
        Ok(())
    }
}

/// Oscillator values at one bar
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct OscillatorPoint {
    pub sma_short: f64,
    pub sma_mid: f64,
    pub sma_long: f64,
    pub diff: f64,
    pub diff_sm: f64,
    pub diff_ml: f64,
    pub dea: f64,
    pub hist: f64,
}

impl OscillatorPoint {
    /// Build a point from the two spreads and the histogram only
    ///
    /// Used when oscillator values come from elsewhere.
    pub fn from_parts(diff_sm: f64, diff_ml: f64, hist: f64) -> Self {
        Self {
            diff_sm,
            diff_ml,
            diff: diff_sm + diff_ml,
            hist,
            ..Default::default()
        }
    }
}

/// Simple moving average over a fixed window
///
/// Until the window fills, the mean covers the values seen so far.
#[derive(Debug, Clone)]
pub struct RollingMean {
    window: usize,
    values: VecDeque<f64>,
}

impl RollingMean {
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
            values: VecDeque::with_capacity(window.max(1)),
        }
    }

    /// Push a value and return the current mean
    pub fn push(&mut self, value: f64) -> f64 {
        if self.values.len() == self.window {
            self.values.pop_front();
        }
        self.values.push_back(value);
        self.values.iter().sum::<f64>() / self.values.len() as f64
    }
}

/// Oscillator calculator
#[derive(Debug, Clone, Copy, Default)]
pub struct Oscillator {
    params: OscillatorParams,
}

impl Oscillator {
    pub fn new(params: OscillatorParams) -> Result<Self, PipelineError> {
        params.validate()?;
        Ok(Self { params })
    }

    /// Oscillator series aligned with `closes`
    pub fn compute(&self, closes: &[f64]) -> Vec<OscillatorPoint> {
        let mut short = RollingMean::new(self.params.short);
        let mut mid = RollingMean::new(self.params.mid);
        let mut long = RollingMean::new(self.params.long);
        let mut signal = RollingMean::new(self.params.signal);

        closes
            .iter()
            .map(|&close| {
                let sma_short = short.push(close);
                let sma_mid = mid.push(close);
                let sma_long = long.push(close);
                let diff = sma_short - sma_long;
                let dea = signal.push(diff);
                OscillatorPoint {
                    sma_short,
                    sma_mid,
                    sma_long,
                    diff,
                    diff_sm: sma_short - sma_mid,
                    diff_ml: sma_mid - sma_long,
                    dea,
                    hist: (diff - dea) * 2.0,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rolling_mean_partial_then_full() {
        let mut mean = RollingMean::new(3);
        assert_eq!(mean.push(3.0), 3.0);
        assert_eq!(mean.push(5.0), 4.0);
        assert_eq!(mean.push(7.0), 5.0);
        assert_eq!(mean.push(9.0), 7.0);
    }

    #[test]
    fn test_constant_series_is_flat() {
        let osc = Oscillator::new(OscillatorParams::default()).unwrap();
        let points = osc.compute(&[10.0; 50]);
        assert_eq!(points.len(), 50);
        for p in points {
            assert_eq!(p.diff, 0.0);
            assert_eq!(p.hist, 0.0);
        }
    }

    #[test]
    fn test_rising_series_has_positive_spreads() {
        let osc = Oscillator::new(OscillatorParams::default()).unwrap();
        let closes: Vec<f64> = (0..60).map(|i| 10.0 + i as f64 * 0.1).collect();
        let last = *osc.compute(&closes).last().unwrap();
        assert!(last.diff_sm > 0.0);
        assert!(last.diff_ml > 0.0);
        assert!((last.diff - (last.diff_sm + last.diff_ml)).abs() < 1e-12);
    }

    #[test]
    fn test_params_validation() {
        let bad = OscillatorParams {
            short: 20,
            mid: 12,
            long: 30,
            signal: 9,
        };
        assert!(Oscillator::new(bad).is_err());
    }
}

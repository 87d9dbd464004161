//! Bollinger bands over period closes
//!
//! `mid` is the mean of the last `window` closes (fewer at the start of the
//! series) and `std` their sample deviation. The bands sit two deviations
//! either side of `mid`; the stop-loss sits two deviations under the lower band.

use crate::errors::PipelineError;
use crate::types::round_to;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Deviations between `mid` and either band
pub const BAND_WIDTH: f64 = 2.0;

const STOP_LOSS_DECIMALS: i32 = 2;

/// Band values at one bar
///
/// Everything but `mid` is `None` while only one close is in the window.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BollingerBand {
    pub mid: f64,
    pub std: Option<f64>,
    pub up: Option<f64>,
    pub dn: Option<f64>,
    pub stop_loss: Option<f64>,
}

impl BollingerBand {
    fn from_window(closes: &VecDeque<f64>) -> Self {
        let n = closes.len() as f64;
        let mid = closes.iter().sum::<f64>() / n;
        let std = (closes.len() > 1).then(|| {
            let squares: f64 = closes.iter().map(|c| (c - mid).powi(2)).sum();
            (squares / (n - 1.0)).sqrt()
        });
        let dn = std.map(|s| mid - BAND_WIDTH * s);
        Self {
            mid,
            std,
            up: std.map(|s| mid + BAND_WIDTH * s),
            dn,
            stop_loss: std
                .zip(dn)
                .map(|(s, dn)| round_to(dn - BAND_WIDTH * s, STOP_LOSS_DECIMALS)),
        }
    }
}

/// Rolling band calculator
#[derive(Debug, Clone, Copy)]
pub struct Bollinger {
    window: usize,
}

impl Bollinger {
    pub fn new(window: usize) -> Result<Self, PipelineError> {
        if window == 0 {
            return Err(PipelineError::invalid_parameter(
                "bollinger_window",
                "must be at least 1",
            ));
        }
        Ok(Self { window })
    }

    /// Bands aligned with `closes`
    pub fn compute(&self, closes: &[f64]) -> Vec<BollingerBand> {
        let mut window = VecDeque::with_capacity(self.window);
        closes
            .iter()
            .map(|&close| {
                if window.len() == self.window {
                    window.pop_front();
                }
                window.push_back(close);
                BollingerBand::from_window(&window)
            })
            .collect()
    }
}

//! Deterministic synthetic market data
//!
//! Prices follow alternating linear legs of varied length and amplitude so
//! that the oscillator produces well separated swings at the 15-minute period.

use super::{trading_day, trading_minutes};
use crate::types::Bar;

/// Minimal linear congruential generator; reproducible noise without a dependency
#[derive(Debug, Clone)]
pub struct Lcg(u64);

impl Lcg {
    pub fn new(seed: u64) -> Self {
        let mut lcg = Self(seed);
        lcg.next_u64();
        lcg
    }

    pub fn next_u64(&mut self) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        self.0 >> 33
    }

    /// Uniform in `[0, 1)`
    pub fn unit(&mut self) -> f64 {
        self.next_u64() as f64 / (1u64 << 31) as f64
    }

    /// Uniform in `[-1, 1)`
    pub fn signed(&mut self) -> f64 {
        self.unit() * 2.0 - 1.0
    }
}

#[derive(Debug, Clone)]
pub struct SwingConfig {
    /// Trading days generated, starting at `trading_day(first_day)`
    pub days: u32,
    pub first_day: u32,
    pub start_price: f64,
    pub base_volume: u64,
    /// Leg lengths in 15-minute periods, cycled
    pub half_periods: Vec<u32>,
    /// Relative move of each leg, cycled
    pub amplitudes: Vec<f64>,
    pub seed: u64,
}

impl Default for SwingConfig {
    fn default() -> Self {
        Self {
            days: 40,
            first_day: 0,
            start_price: 10.0,
            base_volume: 1_000,
            half_periods: vec![23, 31, 45, 27, 38, 52, 29, 41],
            amplitudes: vec![0.05, 0.07, 0.04, 0.08, 0.06, 0.05, 0.09, 0.045],
            seed: 42,
        }
    }
}

/// One-minute bars over `config.days` full sessions
pub fn swing_series(config: &SwingConfig) -> Vec<Bar> {
    let mut rng = Lcg::new(config.seed);
    let mut bars = Vec::with_capacity(config.days as usize * 240);

    let mut leg = 0usize;
    let mut step = 0u32;
    let mut leg_start = config.start_price;
    let mut prev_close = config.start_price;

    for day in 0..config.days {
        let day_factor = 0.7 + 0.6 * rng.unit();
        for (minute, timestamp) in trading_minutes(trading_day(config.first_day + day))
            .into_iter()
            .enumerate()
        {
            let length = config.half_periods[leg % config.half_periods.len()].max(1) * 15;
            let amplitude = config.amplitudes[leg % config.amplitudes.len()];
            let sign = if leg % 2 == 0 { 1.0 } else { -1.0 };

            step += 1;
            let trend = leg_start * (1.0 + sign * amplitude * f64::from(step) / f64::from(length));
            let close = trend * (1.0 + 0.0003 * rng.signed());
            let open = prev_close;
            let wick = 0.0002 * rng.unit();
            let high = open.max(close) * (1.0 + wick);
            let low = open.min(close) * (1.0 - wick);

            // Session opens trade heavier
            let open_boost = if minute < 15 || (120..135).contains(&minute) { 2.5 } else { 1.0 };
            let volume = (config.base_volume as f64
                * day_factor
                * open_boost
                * (0.5 + rng.unit()))
            .round() as u64;

            bars.push(Bar {
                timestamp,
                open,
                high,
                low,
                close,
                volume,
                money: (volume as f64 * close).round() as u64,
            });

            prev_close = close;
            if step >= length {
                leg += 1;
                step = 0;
                leg_start = trend;
            }
        }
    }
    bars
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_series_is_deterministic_and_valid() {
        let config = SwingConfig {
            days: 3,
            ..SwingConfig::default()
        };
        let a = swing_series(&config);
        let b = swing_series(&config);
        assert_eq!(a, b);
        assert_eq!(a.len(), 720);
        for pair in a.windows(2) {
            assert!(pair[0].timestamp < pair[1].timestamp);
        }
        for bar in &a {
            assert!(bar.low <= bar.open.min(bar.close));
            assert!(bar.high >= bar.open.max(bar.close));
            assert!(bar.low > 0.0);
            assert!(bar.volume > 0);
        }
    }

    #[test]
    fn test_first_leg_rises() {
        let bars = swing_series(&SwingConfig {
            days: 2,
            ..SwingConfig::default()
        });
        // First leg: 23 periods of 15 minutes, +5%
        let top = bars[23 * 15 - 1].close;
        assert!(top > bars[0].close * 1.04);
        assert!(bars[23 * 15 + 100].close < top);
    }
}

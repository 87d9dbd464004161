//! Signal, statistics and normalization parameters

use cyclebar_core::{
    NormalizerParams, OscillatorParams, Period, PipelineError, SignalParams, StatisticsParams,
};
use serde::{Deserialize, Serialize};

/// Pipeline tuning knobs, flattened for TOML/env friendliness
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Target period of the derived bars (`15m`, `60m`, `day`, ...)
    pub period: String,

    /// Oscillator moving-average windows, in period bars
    pub short_window: usize,
    pub mid_window: usize,
    pub long_window: usize,
    pub signal_window: usize,

    /// Minimum direction-consistent bars for a signal to survive
    pub min_swing_bars: usize,

    /// Closes averaged by the Bollinger mid line
    pub bollinger_window: usize,

    /// Trailing window of the per-bar volume peaks, in minutes
    pub lookback_minutes: i64,

    /// Rolling window of the daily-volume baseline, in trading days
    pub baseline_window: usize,

    /// MAD multiplier of the robust bounds
    pub mad_multiplier: f64,

    /// Cycles kept in the look-back window of the next run
    pub checkpoint_cycles: usize,

    /// Provisional cycles longer than this are reported as stale
    pub max_provisional_bars: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let oscillator = OscillatorParams::default();
        let normalizer = NormalizerParams::default();
        let signal = SignalParams::default();
        Self {
            period: "15m".to_string(),
            short_window: oscillator.short,
            mid_window: oscillator.mid,
            long_window: oscillator.long,
            signal_window: oscillator.signal,
            min_swing_bars: signal.min_swing_bars,
            bollinger_window: signal.bollinger_window,
            lookback_minutes: StatisticsParams::default().lookback_minutes,
            baseline_window: normalizer.baseline_window,
            mad_multiplier: normalizer.mad_multiplier,
            checkpoint_cycles: 6,
            max_provisional_bars: 160,
        }
    }
}

impl PipelineConfig {
    pub fn period(&self) -> Result<Period, PipelineError> {
        self.period.parse()
    }

    pub fn signal_params(&self) -> SignalParams {
        SignalParams {
            oscillator: OscillatorParams {
                short: self.short_window,
                mid: self.mid_window,
                long: self.long_window,
                signal: self.signal_window,
            },
            min_swing_bars: self.min_swing_bars,
            bollinger_window: self.bollinger_window,
        }
    }

    pub fn statistics_params(&self) -> StatisticsParams {
        StatisticsParams {
            lookback_minutes: self.lookback_minutes,
        }
    }

    /// Normalizer parameters with the default column plan
    pub fn normalizer_params(&self) -> NormalizerParams {
        NormalizerParams {
            baseline_window: self.baseline_window,
            mad_multiplier: self.mad_multiplier,
            ..NormalizerParams::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_core() {
        let config = PipelineConfig::default();
        assert_eq!(config.period().unwrap(), Period::Minutes(15));
        assert_eq!(config.signal_params(), SignalParams::default());
        assert_eq!(config.statistics_params(), StatisticsParams::default());
        assert_eq!(config.normalizer_params(), NormalizerParams::default());
    }

    #[test]
    fn test_bad_period_is_rejected() {
        let config = PipelineConfig {
            period: "weekly".into(),
            ..PipelineConfig::default()
        };
        assert!(matches!(
            config.period(),
            Err(PipelineError::UnsupportedPeriod(_))
        ));
    }
}

use error_stack::{Report, bail};
use serde::Serialize;

use crate::error::IndicatorError;
use crate::indicator::ma::Ema;
use crate::indicator::{Indicator, close_prices, ensure_available};
use crate::model::{Bar, Trend};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MacdReading {
    pub macd_line: f64,
    pub signal_line: f64,
    pub histogram: f64,
    /// `Bullish` only for a strictly positive histogram.
    pub signal: Trend,
}

pub struct Macd {
    fast_period: usize,
    slow_period: usize,
    signal_period: usize,
}

impl Macd {
    pub fn new(
        fast_period: usize,
        slow_period: usize,
        signal_period: usize,
    ) -> Result<Self, Report<IndicatorError>> {
        if fast_period == 0 || slow_period == 0 || signal_period == 0 {
            bail!(IndicatorError::InvalidParameter {
                name: "all periods must be > 0".into(),
            });
        }
        if fast_period >= slow_period {
            bail!(IndicatorError::InvalidParameter {
                name: "fast_period must be < slow_period".into(),
            });
        }
        Ok(Self {
            fast_period,
            slow_period,
            signal_period,
        })
    }

    /// MACD line values, one per bar from index `slow_period` onward.
    ///
    /// Both EMAs are seeded from their own leading SMA window and then advanced
    /// together starting at `slow_period`.
    fn macd_series(&self, prices: &[f64]) -> Vec<f64> {
        let k_fast = 2.0 / (self.fast_period as f64 + 1.0);
        let k_slow = 2.0 / (self.slow_period as f64 + 1.0);
        let mut ema_fast = mean(&prices[..self.fast_period]);
        let mut ema_slow = mean(&prices[..self.slow_period]);

        prices[self.slow_period..]
            .iter()
            .map(|&price| {
                ema_fast = price * k_fast + ema_fast * (1.0 - k_fast);
                ema_slow = price * k_slow + ema_slow * (1.0 - k_slow);
                ema_fast - ema_slow
            })
            .collect()
    }
}

impl Indicator for Macd {
    type Output = MacdReading;

    fn name(&self) -> &str {
        "macd"
    }

    fn required_bars(&self) -> usize {
        self.slow_period + self.signal_period
    }

    fn compute(&self, bars: &[Bar]) -> Result<MacdReading, Report<IndicatorError>> {
        let prices = close_prices(bars);
        ensure_available(self.required_bars(), prices.len())?;

        let macd_values = self.macd_series(&prices);
        let signal_series = Ema::new(self.signal_period)?.calculate_prices(&macd_values)?;

        let macd_line = macd_values[macd_values.len() - 1];
        let signal_line = signal_series[signal_series.len() - 1];
        let histogram = macd_line - signal_line;
        let signal = if histogram > 0.0 {
            Trend::Bullish
        } else {
            Trend::Bearish
        };

        Ok(MacdReading {
            macd_line,
            signal_line,
            histogram,
            signal,
        })
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicator::test_support::{bars_from_closes, compounding_closes};

    #[test]
    fn macd_invalid_fast_ge_slow() {
        assert!(Macd::new(26, 12, 9).is_err());
    }

    #[test]
    fn macd_period_zero_invalid() {
        assert!(Macd::new(0, 26, 9).is_err());
    }

    #[test]
    fn macd_needs_slow_plus_signal_bars() {
        let macd = Macd::new(12, 26, 9).unwrap();
        assert!(macd.compute(&bars_from_closes(&[1.0; 34])).is_err());
        assert!(macd.compute(&bars_from_closes(&[1.0; 35])).is_ok());
    }

    #[test]
    fn macd_zero_histogram_is_bearish() {
        let macd = Macd::new(3, 5, 3).unwrap();
        let reading = macd.compute(&bars_from_closes(&[10.0; 10])).unwrap();
        assert_eq!(reading.histogram, 0.0);
        assert_eq!(reading.signal, Trend::Bearish);
    }

    #[test]
    fn macd_lockstep_known_value() {
        // fast seed 1.5, slow seed 2.0; steps at closes 4 and 5 give
        // macd 1/6 then 7/18, signal seed (1/6 + 7/18) / 2 = 5/18.
        let macd = Macd::new(2, 3, 2).unwrap();
        let reading = macd
            .compute(&bars_from_closes(&[1.0, 2.0, 3.0, 4.0, 5.0]))
            .unwrap();
        assert!((reading.macd_line - 7.0 / 18.0).abs() < 1e-12);
        assert!((reading.signal_line - 5.0 / 18.0).abs() < 1e-12);
        assert!((reading.histogram - 1.0 / 9.0).abs() < 1e-12);
        assert_eq!(reading.signal, Trend::Bullish);
    }

    #[test]
    fn macd_rising_prices_are_bullish() {
        let macd = Macd::new(12, 26, 9).unwrap();
        let reading = macd
            .compute(&bars_from_closes(&compounding_closes(120, 1.01)))
            .unwrap();
        assert!(reading.macd_line > 0.0);
        assert!(reading.histogram > 0.0);
        assert_eq!(reading.signal, Trend::Bullish);
    }

    #[test]
    fn macd_accelerating_decline_is_bearish() {
        let macd = Macd::new(12, 26, 9).unwrap();
        let closes: Vec<f64> = (0..120).map(|i| 1000.0 - 0.05 * (i * i) as f64).collect();
        let reading = macd.compute(&bars_from_closes(&closes)).unwrap();
        assert!(reading.histogram < 0.0);
        assert_eq!(reading.signal, Trend::Bearish);
    }
}

use error_stack::{Report, bail};
use serde::Serialize;

use crate::error::IndicatorError;
use crate::indicator::{Indicator, close_prices, ensure_available};
use crate::model::Bar;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RsiReading {
    pub value: f64,
    pub oversold: bool,
    pub overbought: bool,
}

/// RSI over the trailing `period` deltas, using simple average gain/loss.
pub struct Rsi {
    period: usize,
    oversold: f64,
    overbought: f64,
}

impl Rsi {
    pub fn new(
        period: usize,
        oversold: f64,
        overbought: f64,
    ) -> Result<Self, Report<IndicatorError>> {
        if period == 0 {
            bail!(IndicatorError::InvalidParameter {
                name: "period must be > 0".into(),
            });
        }
        Ok(Self {
            period,
            oversold,
            overbought,
        })
    }
}

impl Default for Rsi {
    fn default() -> Self {
        Self {
            period: 14,
            oversold: 30.0,
            overbought: 70.0,
        }
    }
}

impl Indicator for Rsi {
    type Output = RsiReading;

    fn name(&self) -> &str {
        "rsi"
    }

    fn required_bars(&self) -> usize {
        self.period + 1
    }

    fn compute(&self, bars: &[Bar]) -> Result<RsiReading, Report<IndicatorError>> {
        let prices = close_prices(bars);
        ensure_available(self.required_bars(), prices.len())?;

        let window = &prices[prices.len() - self.required_bars()..];
        let (gains, losses) = window
            .windows(2)
            .map(|w| w[1] - w[0])
            .fold((0.0, 0.0), |(gains, losses), delta| {
                if delta > 0.0 {
                    (gains + delta, losses)
                } else {
                    (gains, losses - delta)
                }
            });

        let avg_gain = gains / self.period as f64;
        let avg_loss = losses / self.period as f64;

        // No losses in the window is reported as overbought regardless of thresholds.
        if avg_loss == 0.0 {
            return Ok(RsiReading {
                value: 100.0,
                oversold: false,
                overbought: true,
            });
        }

        let value = rsi_value(avg_gain, avg_loss);
        Ok(RsiReading {
            value,
            oversold: value < self.oversold,
            overbought: value > self.overbought,
        })
    }
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    let rs = avg_gain / avg_loss;
    100.0 - 100.0 / (1.0 + rs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicator::test_support::bars_from_closes;

    #[test]
    fn rsi_period_zero_invalid() {
        assert!(Rsi::new(0, 30.0, 70.0).is_err());
    }

    #[test]
    fn rsi_needs_a_bar_before_the_window() {
        let rsi = Rsi::default();
        assert!(rsi.compute(&bars_from_closes(&[1.0; 14])).is_err());
        assert!(rsi.compute(&bars_from_closes(&[1.0; 15])).is_ok());
    }

    #[test]
    fn rsi_no_losses_is_100_and_overbought() {
        let rsi = Rsi::new(3, 30.0, 70.0).unwrap();
        let reading = rsi.compute(&bars_from_closes(&[1.0, 2.0, 3.0, 4.0])).unwrap();
        assert_eq!(reading.value, 100.0);
        assert!(reading.overbought);
        assert!(!reading.oversold);
    }

    #[test]
    fn rsi_flat_window_counts_as_no_losses() {
        let rsi = Rsi::new(3, 30.0, 70.0).unwrap();
        let reading = rsi.compute(&bars_from_closes(&[5.0; 4])).unwrap();
        assert_eq!(reading.value, 100.0);
        assert!(reading.overbought);
    }

    #[test]
    fn rsi_no_losses_overbought_even_with_high_threshold() {
        let rsi = Rsi::new(3, 30.0, 100.0).unwrap();
        let reading = rsi.compute(&bars_from_closes(&[1.0, 2.0, 3.0, 4.0])).unwrap();
        assert!(reading.overbought);
    }

    #[test]
    fn rsi_all_losses_returns_0_and_oversold() {
        let rsi = Rsi::new(3, 30.0, 70.0).unwrap();
        let reading = rsi.compute(&bars_from_closes(&[4.0, 3.0, 2.0, 1.0])).unwrap();
        assert!(reading.value.abs() < 1e-9);
        assert!(reading.oversold);
        assert!(!reading.overbought);
    }

    #[test]
    fn rsi_only_looks_at_trailing_window() {
        let rsi = Rsi::new(4, 30.0, 70.0).unwrap();
        // The early crash is outside the trailing 4 deltas.
        let reading = rsi
            .compute(&bars_from_closes(&[100.0, 10.0, 11.0, 10.0, 11.0, 10.0]))
            .unwrap();
        assert!((reading.value - 50.0).abs() < 1e-9);
        assert!(!reading.oversold);
        assert!(!reading.overbought);
    }

    #[test]
    fn rsi_stays_within_bounds() {
        let rsi = Rsi::default();
        let closes: Vec<f64> = (0..40).map(|i| 50.0 + ((i * 7) % 11) as f64 - 5.0).collect();
        let reading = rsi.compute(&bars_from_closes(&closes)).unwrap();
        assert!((0.0..=100.0).contains(&reading.value));
    }
}

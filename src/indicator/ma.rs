use error_stack::{Report, bail};

use crate::error::IndicatorError;
use crate::indicator::{Indicator, close_prices, ensure_available};
use crate::model::Bar;

/// Simple Moving Average.
pub struct Sma {
    period: usize,
}

impl Sma {
    pub fn new(period: usize) -> Result<Self, Report<IndicatorError>> {
        if period == 0 {
            bail!(IndicatorError::InvalidParameter {
                name: "period must be > 0".into(),
            });
        }
        Ok(Self { period })
    }

    /// Mean of the last `period` prices.
    pub fn last_value(&self, prices: &[f64]) -> Result<f64, Report<IndicatorError>> {
        ensure_available(self.period, prices.len())?;
        let window = &prices[prices.len() - self.period..];
        Ok(window.iter().sum::<f64>() / self.period as f64)
    }
}

impl Indicator for Sma {
    type Output = f64;

    fn name(&self) -> &str {
        "sma"
    }

    fn required_bars(&self) -> usize {
        self.period
    }

    fn compute(&self, bars: &[Bar]) -> Result<f64, Report<IndicatorError>> {
        self.last_value(&close_prices(bars))
    }
}

/// Exponential Moving Average.
pub struct Ema {
    period: usize,
}

impl Ema {
    pub fn new(period: usize) -> Result<Self, Report<IndicatorError>> {
        if period == 0 {
            bail!(IndicatorError::InvalidParameter {
                name: "period must be > 0".into(),
            });
        }
        Ok(Self { period })
    }

    /// EMA series from a price slice.
    ///
    /// The first value is the SMA seed at index `period - 1` of `prices`; each
    /// following value lines up with the next price.
    pub fn calculate_prices(&self, prices: &[f64]) -> Result<Vec<f64>, Report<IndicatorError>> {
        ensure_available(self.period, prices.len())?;

        let k = 2.0 / (self.period as f64 + 1.0);
        let seed: f64 = prices[..self.period].iter().sum::<f64>() / self.period as f64;
        let mut ema = seed;
        let mut results = Vec::with_capacity(prices.len() - self.period + 1);
        results.push(ema);

        for &price in &prices[self.period..] {
            ema = price * k + ema * (1.0 - k);
            results.push(ema);
        }

        Ok(results)
    }
}

impl Indicator for Ema {
    type Output = f64;

    fn name(&self) -> &str {
        "ema"
    }

    fn required_bars(&self) -> usize {
        self.period
    }

    fn compute(&self, bars: &[Bar]) -> Result<f64, Report<IndicatorError>> {
        let series = self.calculate_prices(&close_prices(bars))?;
        // calculate_prices always yields the seed
        Ok(series[series.len() - 1])
    }
}

use error_stack::Report;
use serde::Serialize;

use crate::error::IndicatorError;
use crate::indicator::Indicator;
use crate::indicator::ma::Sma;
use crate::model::{Bar, Trend};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrendReading {
    pub ma200: f64,
    pub close: f64,
    pub above: bool,
    pub trend: Trend,
}

/// Long-term trend: last close relative to the 200-bar simple average.
pub struct LongTermTrend {
    period: usize,
}

impl Default for LongTermTrend {
    fn default() -> Self {
        Self { period: 200 }
    }
}

impl Indicator for LongTermTrend {
    type Output = TrendReading;

    fn name(&self) -> &str {
        "trend200"
    }

    fn required_bars(&self) -> usize {
        self.period
    }

    fn compute(&self, bars: &[Bar]) -> Result<TrendReading, Report<IndicatorError>> {
        let ma200 = Sma::new(self.period)?.compute(bars)?;
        let close = bars[bars.len() - 1].close;
        let above = close > ma200;
        Ok(TrendReading {
            ma200,
            close,
            above,
            trend: if above { Trend::Bullish } else { Trend::Bearish },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicator::test_support::{bars_from_closes, compounding_closes};

    #[test]
    fn trend_undefined_below_200_bars() {
        let bars = bars_from_closes(&[1.0; 199]);
        assert!(LongTermTrend::default().compute(&bars).is_err());
    }

    #[test]
    fn close_above_average_is_bullish() {
        let bars = bars_from_closes(&compounding_closes(250, 1.01));
        let reading = LongTermTrend::default().compute(&bars).unwrap();
        assert!(reading.above);
        assert_eq!(reading.trend, Trend::Bullish);
        assert!(reading.close > reading.ma200);
    }

    #[test]
    fn close_equal_to_average_is_bearish() {
        let bars = bars_from_closes(&[50.0; 200]);
        let reading = LongTermTrend::default().compute(&bars).unwrap();
        assert!(!reading.above);
        assert_eq!(reading.trend, Trend::Bearish);
    }
}

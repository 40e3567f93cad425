pub mod bravo9;
pub mod ma;
pub mod macd;
pub mod rsi;
pub mod trend;

use std::collections::BTreeMap;

use error_stack::{Report, bail};
use serde::Serialize;

use crate::config::StrategyConfig;
use crate::error::IndicatorError;
use crate::model::Bar;

use bravo9::{Bravo9, Bravo9Reading};
use ma::Sma;
use macd::{Macd, MacdReading};
use rsi::{Rsi, RsiReading};
use trend::{LongTermTrend, TrendReading};

/// A technical analysis indicator evaluated at the most recent bar.
///
/// Bars must be in ascending chronological order (oldest first).
pub trait Indicator {
    type Output;

    /// Unique name of this indicator (e.g., "rsi", "sma").
    fn name(&self) -> &str;

    /// Minimum number of bars required to produce a value.
    fn required_bars(&self) -> usize;

    fn compute(&self, bars: &[Bar]) -> Result<Self::Output, Report<IndicatorError>>;
}

/// Extract close prices from a slice of bars.
pub fn close_prices(bars: &[Bar]) -> Vec<f64> {
    bars.iter().map(|b| b.close).collect()
}

pub(crate) fn ensure_available(
    required: usize,
    available: usize,
) -> Result<(), Report<IndicatorError>> {
    if available < required {
        bail!(IndicatorError::InsufficientData {
            required,
            available,
        });
    }
    Ok(())
}

/// Indicator snapshot for one (symbol, timeframe) as of its last bar.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndicatorBundle {
    /// Period -> simple moving average, only for periods with enough history.
    pub moving_averages: BTreeMap<usize, f64>,
    pub trend200: Option<TrendReading>,
    pub rsi: Option<RsiReading>,
    pub macd: Option<MacdReading>,
    pub bravo9: Option<Bravo9Reading>,
    pub current_price: f64,
    pub last_bar: Bar,
}

/// Assemble the indicator bundle for `bars`.
///
/// Returns `None` only when `bars` is empty; individual indicators without
/// enough history are left out of the bundle.
pub fn compute_indicators(bars: &[Bar], strategy: &StrategyConfig) -> Option<IndicatorBundle> {
    let last_bar = bars.last()?.clone();

    let moving_averages = strategy
        .ma_periods
        .iter()
        .filter_map(|&period| {
            let sma = Sma::new(period).ok()?;
            reading(&sma, bars).map(|value| (period, value))
        })
        .collect();

    let rsi = Rsi::new(
        strategy.rsi_period,
        strategy.rsi_oversold,
        strategy.rsi_overbought,
    )
    .ok()
    .and_then(|rsi| reading(&rsi, bars));

    let macd = Macd::new(12, 26, 9)
        .ok()
        .and_then(|macd| reading(&macd, bars));

    Some(IndicatorBundle {
        moving_averages,
        trend200: reading(&LongTermTrend::default(), bars),
        rsi,
        macd,
        bravo9: reading(&Bravo9, bars),
        current_price: last_bar.close,
        last_bar,
    })
}

fn reading<I: Indicator>(indicator: &I, bars: &[Bar]) -> Option<I::Output> {
    match indicator.compute(bars) {
        Ok(value) => Some(value),
        Err(report) => {
            tracing::trace!(
                indicator = indicator.name(),
                required = indicator.required_bars(),
                available = bars.len(),
                error = %report,
                "indicator undefined"
            );
            None
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::{bars_from_closes, compounding_closes};
    use super::*;
    use crate::indicator::bravo9::Bravo9Signal;
    use crate::model::Trend;

    fn strategy() -> StrategyConfig {
        StrategyConfig::default()
    }

    #[test]
    fn empty_bars_yield_no_bundle() {
        assert!(compute_indicators(&[], &strategy()).is_none());
    }

    #[test]
    fn single_bar_yields_bundle_with_only_price() {
        let bars = bars_from_closes(&[42.0]);
        let bundle = compute_indicators(&bars, &strategy()).unwrap();
        assert_eq!(bundle.current_price, 42.0);
        assert!(bundle.moving_averages.is_empty());
        assert!(bundle.trend200.is_none());
        assert!(bundle.rsi.is_none());
        assert!(bundle.macd.is_none());
        assert!(bundle.bravo9.is_none());
    }

    #[test]
    fn moving_averages_only_for_periods_with_history() {
        let bars = bars_from_closes(&compounding_closes(60, 1.001));
        let bundle = compute_indicators(&bars, &strategy()).unwrap();
        assert!(bundle.moving_averages.contains_key(&20));
        assert!(bundle.moving_averages.contains_key(&50));
        assert!(!bundle.moving_averages.contains_key(&200));
    }

    #[test]
    fn rising_history_produces_bullish_bundle() {
        let bars = bars_from_closes(&compounding_closes(250, 1.01));
        let bundle = compute_indicators(&bars, &strategy()).unwrap();

        let trend = bundle.trend200.unwrap();
        assert_eq!(trend.trend, Trend::Bullish);
        assert!(trend.above);

        let rsi = bundle.rsi.unwrap();
        assert_eq!(rsi.value, 100.0);
        assert!(rsi.overbought);
        assert!(!rsi.oversold);

        let macd = bundle.macd.unwrap();
        assert!(macd.histogram > 0.0);
        assert_eq!(macd.signal, Trend::Bullish);

        assert_eq!(bundle.bravo9.unwrap().signal, Bravo9Signal::StrongBullish);
        assert_eq!(bundle.moving_averages.len(), 3);
    }

    #[test]
    fn fifty_bars_leave_long_windows_undefined() {
        let bars = bars_from_closes(&compounding_closes(50, 1.001));
        let bundle = compute_indicators(&bars, &strategy()).unwrap();
        assert!(bundle.trend200.is_none());
        assert!(bundle.bravo9.is_none());
        assert!(bundle.rsi.is_some());
        assert!(bundle.macd.is_some());
    }

    #[test]
    fn rsi_thresholds_follow_strategy() {
        // Alternating +1/-1 deltas give RSI 50.
        let closes: Vec<f64> = (0..30).map(|i| if i % 2 == 0 { 10.0 } else { 11.0 }).collect();
        let bars = bars_from_closes(&closes);
        let mut config = strategy();
        config.rsi_overbought = 45.0;
        let bundle = compute_indicators(&bars, &config).unwrap();
        let rsi = bundle.rsi.unwrap();
        assert!((rsi.value - 50.0).abs() < 1e-9);
        assert!(rsi.overbought);
    }

    #[test]
    fn bundle_serializes_with_camel_case_keys() {
        let bars = bars_from_closes(&[1.0, 2.0]);
        let bundle = compute_indicators(&bars, &strategy()).unwrap();
        let json = serde_json::to_value(&bundle).unwrap();
        assert!(json.get("movingAverages").is_some());
        assert!(json.get("currentPrice").is_some());
        assert!(json.get("lastBar").is_some());
    }
}

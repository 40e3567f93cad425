//! Bravo9: EMA9 / EMA20 / SMA180 stacking used to flag reversal strength.

use std::fmt;

use error_stack::Report;
use serde::{Deserialize, Serialize};

use crate::error::IndicatorError;
use crate::indicator::ma::{Ema, Sma};
use crate::indicator::{Indicator, close_prices, ensure_available};
use crate::model::Bar;

const FAST_EMA: usize = 9;
const SLOW_EMA: usize = 20;
const BASE_SMA: usize = 180;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bravo9Signal {
    Bullish,
    Bearish,
    StrongBullish,
    StrongBearish,
}

impl Bravo9Signal {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bullish => "bullish",
            Self::Bearish => "bearish",
            Self::StrongBullish => "strong_bullish",
            Self::StrongBearish => "strong_bearish",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "bullish" => Some(Self::Bullish),
            "bearish" => Some(Self::Bearish),
            "strong_bullish" => Some(Self::StrongBullish),
            "strong_bearish" => Some(Self::StrongBearish),
            _ => None,
        }
    }

    pub fn is_strong(self) -> bool {
        matches!(self, Self::StrongBullish | Self::StrongBearish)
    }
}

impl fmt::Display for Bravo9Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bravo9Reading {
    pub ema9: f64,
    pub ema20: f64,
    pub sma180: f64,
    pub close: f64,
    pub above_ema9: bool,
    pub signal: Bravo9Signal,
    pub strong_bullish: bool,
    pub strong_bearish: bool,
    pub bars_since_ema9_cross: Option<usize>,
}

pub struct Bravo9;

impl Indicator for Bravo9 {
    type Output = Bravo9Reading;

    fn name(&self) -> &str {
        "bravo9"
    }

    fn required_bars(&self) -> usize {
        BASE_SMA
    }

    fn compute(&self, bars: &[Bar]) -> Result<Bravo9Reading, Report<IndicatorError>> {
        ensure_available(self.required_bars(), bars.len())?;

        let prices = close_prices(bars);
        let ema9 = Ema::new(FAST_EMA)?.compute(bars)?;
        let ema20 = Ema::new(SLOW_EMA)?.compute(bars)?;
        let sma180 = Sma::new(BASE_SMA)?.last_value(&prices)?;
        let close = prices[prices.len() - 1];

        let above_ema9 = close > ema9;
        let strong_bullish = above_ema9 && ema9 > ema20 && ema20 > sma180;
        let strong_bearish = !above_ema9 && ema9 < ema20 && ema20 < sma180;

        let signal = match (above_ema9, strong_bullish, strong_bearish) {
            (_, true, _) => Bravo9Signal::StrongBullish,
            (_, _, true) => Bravo9Signal::StrongBearish,
            (true, _, _) => Bravo9Signal::Bullish,
            (false, _, _) => Bravo9Signal::Bearish,
        };

        Ok(Bravo9Reading {
            ema9,
            ema20,
            sma180,
            close,
            above_ema9,
            signal,
            strong_bullish,
            strong_bearish,
            bars_since_ema9_cross: bars_since_ema9_cross(&prices),
        })
    }
}

/// Bars since the close last crossed EMA9, `0` when it crossed on the latest bar.
///
/// A cross needs a non-zero `close - ema9` on both bars with opposite signs.
/// `None` when history is too short or no cross exists.
pub fn bars_since_ema9_cross(prices: &[f64]) -> Option<usize> {
    if prices.len() < FAST_EMA + 1 {
        return None;
    }
    // series[j] is the EMA9 through bar j + FAST_EMA - 1
    let series = Ema::new(FAST_EMA).ok()?.calculate_prices(prices).ok()?;
    let diff_at = |i: usize| prices[i] - series[i + 1 - FAST_EMA];

    let last_cross = (FAST_EMA..prices.len()).rev().find(|&i| {
        let prev = diff_at(i - 1);
        let curr = diff_at(i);
        prev != 0.0 && curr != 0.0 && (prev > 0.0) != (curr > 0.0)
    })?;

    Some(prices.len() - 1 - last_cross)
}

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::indicator::bravo9::{Bravo9Reading, Bravo9Signal};

/// Bar timeframe supported by the market-data provider.
///
/// String representations match the provider's tokens (e.g. `"1Day"`, `"1Hour"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeFrame {
    #[serde(rename = "1Min")]
    Min1,
    #[serde(rename = "5Min")]
    Min5,
    #[serde(rename = "15Min")]
    Min15,
    #[serde(rename = "30Min")]
    Min30,
    #[serde(rename = "1Hour")]
    Hour1,
    #[serde(rename = "2Hour")]
    Hour2,
    #[serde(rename = "4Hour")]
    Hour4,
    #[serde(rename = "6Hour")]
    Hour6,
    #[serde(rename = "1Day")]
    Day1,
    #[serde(rename = "1Week")]
    Week1,
    #[serde(rename = "1Month")]
    Month1,
}

impl TimeFrame {
    pub const ALL: [TimeFrame; 11] = [
        Self::Min1,
        Self::Min5,
        Self::Min15,
        Self::Min30,
        Self::Hour1,
        Self::Hour2,
        Self::Hour4,
        Self::Hour6,
        Self::Day1,
        Self::Week1,
        Self::Month1,
    ];

    /// Parse a config token into a `TimeFrame`.
    ///
    /// Canonical tokens match exactly; short aliases (`"1d"`, `"1hour"`, ...)
    /// match case-insensitively. Note that `"1m"` means one month.
    pub fn from_str(s: &str) -> Option<Self> {
        let s = s.trim();
        if let Some(tf) = Self::ALL.into_iter().find(|tf| tf.as_str() == s) {
            return Some(tf);
        }
        match s.to_ascii_lowercase().as_str() {
            "1min" => Some(Self::Min1),
            "5min" => Some(Self::Min5),
            "15min" => Some(Self::Min15),
            "30min" => Some(Self::Min30),
            "1hour" => Some(Self::Hour1),
            "2hour" => Some(Self::Hour2),
            "4hour" => Some(Self::Hour4),
            "6hour" => Some(Self::Hour6),
            "1day" | "1d" => Some(Self::Day1),
            "1week" | "1w" => Some(Self::Week1),
            "1month" | "1m" => Some(Self::Month1),
            _ => None,
        }
    }

    /// Return the provider token for this timeframe.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Min1 => "1Min",
            Self::Min5 => "5Min",
            Self::Min15 => "15Min",
            Self::Min30 => "30Min",
            Self::Hour1 => "1Hour",
            Self::Hour2 => "2Hour",
            Self::Hour4 => "4Hour",
            Self::Hour6 => "6Hour",
            Self::Day1 => "1Day",
            Self::Week1 => "1Week",
            Self::Month1 => "1Month",
        }
    }
}

impl fmt::Display for TimeFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One OHLCV sample. Sequences are ordered oldest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Bullish,
    Bearish,
}

impl Trend {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bullish => "bullish",
            Self::Bearish => "bearish",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "bullish" => Some(Self::Bullish),
            "bearish" => Some(Self::Bearish),
            _ => None,
        }
    }
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Direction recommended by the reasoning service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Long,
    Short,
    #[default]
    None,
}

impl Side {
    pub fn from_str(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "long" => Self::Long,
            "short" => Self::Short,
            _ => Self::None,
        }
    }

    /// The side a candidate can be opened on, or `None` for "no trade".
    pub fn tradable(self) -> Option<TradeSide> {
        match self {
            Self::Long => Some(TradeSide::Long),
            Self::Short => Some(TradeSide::Short),
            Self::None => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Long,
    Short,
}

impl TradeSide {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Long => "long",
            Self::Short => "short",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Side::from_str(s).tradable()
    }
}

impl fmt::Display for TradeSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Structured reply of the reasoning service.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub recommendation: Side,
    pub confidence: f64,
    pub momentum_prediction: Option<String>,
    pub position_size_suggestion: Option<f64>,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub reasoning: String,
}

impl Recommendation {
    /// Degraded "no trade" reply that keeps the raw text for review.
    pub fn none_with_reasoning(reasoning: impl Into<String>) -> Self {
        Self {
            reasoning: reasoning.into(),
            ..Self::default()
        }
    }
}

/// A persisted, indicator-justified trading opportunity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub sweep_id: String,
    pub symbol: String,
    pub timeframe: TimeFrame,
    pub side: TradeSide,
    pub confidence: f64,
    pub suggested_size: Option<f64>,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub reasoning: String,
    pub current_price: f64,
    pub rsi: Option<f64>,
    pub bravo9_signal: Option<Bravo9Signal>,
    pub bravo9: Option<Bravo9Reading>,
    pub trend_200: Option<Trend>,
    pub macd_signal: Option<Trend>,
    pub momentum_prediction: Option<String>,
    pub scanned_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeframe_canonical_tokens_parse() {
        for tf in TimeFrame::ALL {
            assert_eq!(TimeFrame::from_str(tf.as_str()), Some(tf));
        }
    }

    #[test]
    fn timeframe_aliases_are_case_insensitive() {
        assert_eq!(TimeFrame::from_str("1d"), Some(TimeFrame::Day1));
        assert_eq!(TimeFrame::from_str("1DAY"), Some(TimeFrame::Day1));
        assert_eq!(TimeFrame::from_str(" 1hour "), Some(TimeFrame::Hour1));
        assert_eq!(TimeFrame::from_str("1W"), Some(TimeFrame::Week1));
    }

    #[test]
    fn timeframe_one_m_alias_means_month() {
        assert_eq!(TimeFrame::from_str("1m"), Some(TimeFrame::Month1));
    }

    #[test]
    fn timeframe_invalid_string_returns_none() {
        assert_eq!(TimeFrame::from_str("3Min"), None);
        assert_eq!(TimeFrame::from_str(""), None);
    }

    #[test]
    fn timeframe_serializes_as_provider_token() {
        let json = serde_json::to_string(&TimeFrame::Hour4).unwrap();
        assert_eq!(json, "\"4Hour\"");
    }

    #[test]
    fn side_parsing_defaults_to_none() {
        assert_eq!(Side::from_str("LONG"), Side::Long);
        assert_eq!(Side::from_str("short"), Side::Short);
        assert_eq!(Side::from_str("hold"), Side::None);
        assert_eq!(Side::None.tradable(), None);
        assert_eq!(Side::Long.tradable(), Some(TradeSide::Long));
    }

    #[test]
    fn trend_display() {
        assert_eq!(Trend::Bullish.to_string(), "bullish");
        assert_eq!(Trend::from_str("bearish"), Some(Trend::Bearish));
    }
}

use std::fmt;

use crate::indicator::IndicatorBundle;
use crate::model::Trend;

/// Why a bundle was (or was not) escalated to the reasoning service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Qualification {
    /// Bravo9 reports a strong stacked reversal; sufficient on its own.
    StrongReversal,
    /// RSI is oversold or overbought while the 200-bar trend is known.
    RsiExtreme,
    /// MACD direction matches the 200-bar trend.
    MacdAligned(Trend),
    /// No 200-bar trend, so direction cannot be judged.
    NoTrend,
    NoConfluence,
}

impl Qualification {
    pub fn qualifies(self) -> bool {
        matches!(
            self,
            Self::StrongReversal | Self::RsiExtreme | Self::MacdAligned(_)
        )
    }
}

impl fmt::Display for Qualification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StrongReversal => write!(f, "strong bravo9 reversal"),
            Self::RsiExtreme => write!(f, "rsi at extreme"),
            Self::MacdAligned(trend) => write!(f, "macd aligned with {trend} trend"),
            Self::NoTrend => write!(f, "no 200-bar trend"),
            Self::NoConfluence => write!(f, "no confluence"),
        }
    }
}

/// Confluence gate in front of the reasoning call.
///
/// Rules apply in order: a strong Bravo9 signal qualifies alone; otherwise a
/// 200-bar trend is required, and then either an RSI extreme or a MACD signal
/// matching the trend direction qualifies.
pub fn qualify(bundle: &IndicatorBundle) -> Qualification {
    if bundle.bravo9.is_some_and(|b| b.signal.is_strong()) {
        return Qualification::StrongReversal;
    }

    let Some(trend) = bundle.trend200.map(|t| t.trend) else {
        return Qualification::NoTrend;
    };

    if bundle.rsi.is_some_and(|r| r.oversold || r.overbought) {
        return Qualification::RsiExtreme;
    }

    match bundle.macd {
        Some(macd) if macd.signal == trend => Qualification::MacdAligned(trend),
        _ => Qualification::NoConfluence,
    }
}

#[cfg(test)]
pub fn is_worth_escalating(bundle: &IndicatorBundle) -> bool {
    qualify(bundle).qualifies()
}

//! User prompt sent with every reasoning request.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::indicator::bravo9::Bravo9Signal;
use crate::model::{Bar, Trend};
use crate::reasoning::ReasoningRequest;

const RECENT_BARS: usize = 30;

const STRATEGY_CONTEXT: &str = "\
We use confluence across these signals to find high-probability setups:
1. 200 MA: overall trend. Price above the 200 MA is bullish (favor longs), below is bearish (favor shorts).
2. Bravo 9: reversal potential. strong_bullish / strong_bearish alignment of EMA9, EMA20 and SMA180 marks strong reversal setups and is the primary entry signal.
3. RSI: momentum. Oversold or overbought readings confirm or caution the trade.
4. MACD: momentum. Bullish (histogram > 0) or bearish (histogram <= 0) confirms direction and strength.
Strong confluence means the 200 MA trend, a Bravo 9 reversal signal, and RSI and MACD all point the same way.";

const INSTRUCTIONS: &str = "\
1. Note the 200 MA trend to decide the long or short bias.
2. Assess Bravo 9 for reversal potential.
3. Use RSI and MACD to judge whether momentum supports or contradicts the setup.
4. Give a short prediction of the likely momentum move.
5. Recommend \"long\" or \"short\" only on strong confluence in that direction; otherwise recommend \"none\" and say what you are waiting for.
6. For long or short, provide stopLoss and takeProfit price levels, confidence (0-1) and an optional positionSizeSuggestion.
Respond with a single JSON object only: { \"recommendation\": \"long\"|\"short\"|\"none\", \"confidence\": 0-1, \"momentumPrediction\": \"string\", \"positionSizeSuggestion\": number|null, \"stopLoss\": number|null, \"takeProfit\": number|null, \"reasoning\": \"string\" }. No other text.";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TradingSummary<'a> {
    symbol: &'a str,
    timeframe: &'a str,
    entry: f64,
    trend200: Option<TrendSummary>,
    rsi: Option<RsiSummary>,
    macd: Option<MacdSummary>,
    bravo9: Option<Bravo9Summary>,
    moving_averages: Option<&'a BTreeMap<usize, f64>>,
}

#[derive(Debug, Serialize)]
struct TrendSummary {
    trend: Trend,
    above: bool,
    ma200: f64,
}

#[derive(Debug, Serialize)]
struct RsiSummary {
    value: f64,
    oversold: bool,
    overbought: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MacdSummary {
    signal: Trend,
    histogram: f64,
    macd_line: f64,
    signal_line: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Bravo9Summary {
    signal: Bravo9Signal,
    ema9: f64,
    ema20: f64,
    sma180: f64,
    strong_bullish: bool,
    strong_bearish: bool,
}

#[derive(Debug, Serialize)]
struct CompactBar {
    t: String,
    o: f64,
    h: f64,
    l: f64,
    c: f64,
    v: f64,
}

impl From<&Bar> for CompactBar {
    fn from(bar: &Bar) -> Self {
        Self {
            t: bar.time.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            o: bar.open,
            h: bar.high,
            l: bar.low,
            c: bar.close,
            v: bar.volume,
        }
    }
}

fn summarize<'a>(request: &'a ReasoningRequest<'a>) -> TradingSummary<'a> {
    let indicators = request.indicators;
    TradingSummary {
        symbol: request.symbol,
        timeframe: request.timeframe.as_str(),
        entry: request.entry_price(),
        trend200: indicators.trend200.map(|t| TrendSummary {
            trend: t.trend,
            above: t.above,
            ma200: t.ma200,
        }),
        rsi: indicators.rsi.map(|r| RsiSummary {
            value: r.value,
            oversold: r.oversold,
            overbought: r.overbought,
        }),
        macd: indicators.macd.map(|m| MacdSummary {
            signal: m.signal,
            histogram: m.histogram,
            macd_line: m.macd_line,
            signal_line: m.signal_line,
        }),
        bravo9: indicators.bravo9.map(|b| Bravo9Summary {
            signal: b.signal,
            ema9: b.ema9,
            ema20: b.ema20,
            sma180: b.sma180,
            strong_bullish: b.strong_bullish,
            strong_bearish: b.strong_bearish,
        }),
        moving_averages: (!indicators.moving_averages.is_empty())
            .then_some(&indicators.moving_averages),
    }
}

/// Build the user message for `request`.
pub fn build_user_prompt(request: &ReasoningRequest<'_>) -> String {
    let summary = serde_json::to_string_pretty(&summarize(request)).unwrap_or_default();
    let indicators = serde_json::to_string_pretty(request.indicators).unwrap_or_default();
    let skip = request.bars.len().saturating_sub(RECENT_BARS);
    let recent: Vec<CompactBar> = request.bars[skip..].iter().map(CompactBar::from).collect();
    let recent = serde_json::to_string(&recent).unwrap_or_default();

    format!(
        "This is a single-asset, single-timeframe session. Evaluate ONLY {symbol} on the {timeframe} \
         timeframe. Do not consider any other symbols or timeframes.\n\n\
         --- TRADING SUMMARY ---\n{summary}\n\n\
         --- FULL INDICATORS ---\n{indicators}\n\n\
         --- RECENT OHLCV BARS (last {RECENT_BARS}) ---\n{recent}\n\n\
         --- STRATEGY CONTEXT ---\n{STRATEGY_CONTEXT}\n\n\
         --- INSTRUCTIONS ---\n{INSTRUCTIONS}",
        symbol = request.symbol,
        timeframe = request.timeframe,
    )
}

/// Cut `text` to at most `max_chars` characters for logging.
pub fn truncate_for_log(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_owned(),
    }
}

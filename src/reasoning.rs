pub mod openai;
pub mod prompt;

use std::future::Future;
use std::time::Duration;

use error_stack::Report;
use futures::future::BoxFuture;
use serde_json::Value;
use tracing::warn;

use crate::config::ReasoningConfig;
use crate::error::ReasoningError;
use crate::indicator::IndicatorBundle;
use crate::model::{Bar, Recommendation, Side, TimeFrame};

/// Everything the reasoning service sees for one (symbol, timeframe) step.
#[derive(Debug, Clone, Copy)]
pub struct ReasoningRequest<'a> {
    pub symbol: &'a str,
    pub timeframe: TimeFrame,
    pub bars: &'a [Bar],
    pub indicators: &'a IndicatorBundle,
    /// Latest trade price; the bundle's current price is used when absent.
    pub current_price: Option<f64>,
}

impl ReasoningRequest<'_> {
    pub fn entry_price(&self) -> f64 {
        self.current_price.unwrap_or(self.indicators.current_price)
    }
}

/// Produces a trade recommendation from indicators and recent bars.
///
/// Implementations retry their own throttling signal and degrade malformed
/// replies to a `none` recommendation instead of failing.
pub trait ReasoningService: Send + Sync {
    fn recommend<'a>(
        &'a self,
        request: ReasoningRequest<'a>,
    ) -> BoxFuture<'a, Result<Recommendation, Report<ReasoningError>>>;
}

/// Linear backoff applied to throttled reasoning calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub max_attempts: u32,
    /// Wait after throttled attempt `n` (0-based) is `(n + 1) * step`.
    pub step: Duration,
}

impl Backoff {
    pub fn from_config(config: &ReasoningConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            step: Duration::from_millis(config.backoff_step_ms),
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            step: Duration::from_secs(3),
        }
    }
}

/// Run `call` until it succeeds, fails with a non-throttling error, or the
/// attempt budget is spent.
pub async fn with_backoff<T, F, Fut>(
    backoff: Backoff,
    mut call: F,
) -> Result<T, Report<ReasoningError>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Report<ReasoningError>>>,
{
    let mut attempt = 0;
    loop {
        match call().await {
            Err(report)
                if matches!(report.current_context(), ReasoningError::RateLimited)
                    && attempt + 1 < backoff.max_attempts =>
            {
                let wait = backoff.step * (attempt + 1);
                warn!(
                    attempt = attempt + 1,
                    max_attempts = backoff.max_attempts,
                    wait_ms = wait.as_millis() as u64,
                    "reasoning service throttled, backing off"
                );
                tokio::time::sleep(wait).await;
                attempt += 1;
            }
            other => return other,
        }
    }
}

/// Parse a model reply into a `Recommendation`.
///
/// Code fences are stripped first. A reply that is not a JSON object becomes
/// a `none` recommendation carrying the raw text as its reasoning.
pub fn parse_recommendation(content: &str) -> Recommendation {
    let object = match serde_json::from_str::<Value>(strip_fences(content)) {
        Ok(Value::Object(object)) => object,
        _ => return Recommendation::none_with_reasoning(content.trim()),
    };

    let recommendation = object
        .get("recommendation")
        .and_then(Value::as_str)
        .map(Side::from_str)
        .unwrap_or_default();
    let confidence = object
        .get("confidence")
        .and_then(number)
        .unwrap_or(0.0)
        .clamp(0.0, 1.0);

    Recommendation {
        recommendation,
        confidence,
        momentum_prediction: object
            .get("momentumPrediction")
            .and_then(Value::as_str)
            .map(str::to_owned),
        position_size_suggestion: object.get("positionSizeSuggestion").and_then(number),
        stop_loss: object.get("stopLoss").and_then(number),
        take_profit: object.get("takeProfit").and_then(number),
        reasoning: object
            .get("reasoning")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned(),
    }
}

fn strip_fences(content: &str) -> &str {
    let mut body = content.trim();
    if let Some(rest) = body.strip_prefix("```") {
        body = rest
            .strip_prefix("json")
            .or_else(|| rest.strip_prefix("JSON"))
            .unwrap_or(rest);
    }
    if let Some(rest) = body.trim_end().strip_suffix("```") {
        body = rest;
    }
    body.trim()
}

/// A finite number, or a string holding one.
fn number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    n.is_finite().then_some(n)
}

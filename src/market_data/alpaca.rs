use std::collections::HashMap;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use error_stack::{Report, ResultExt};
use futures::future::BoxFuture;
use serde::Deserialize;
use tracing::debug;

use crate::config::{BarsQuery, MarketDataConfig};
use crate::error::MarketDataError;
use crate::market_data::{MarketClock, MarketData};
use crate::market_data::fetch::RateLimitedFetcher;
use crate::model::{Bar, TimeFrame};

const PROVIDER: &str = "alpaca";

pub struct AlpacaClient {
    client: reqwest::Client,
    data_url: String,
    trading_url: String,
    key_id: String,
    secret_key: String,
    fetcher: RateLimitedFetcher,
}

impl AlpacaClient {
    pub fn new(
        data_url: impl Into<String>,
        trading_url: impl Into<String>,
        key_id: impl Into<String>,
        secret_key: impl Into<String>,
        fetcher: RateLimitedFetcher,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            data_url: data_url.into().trim_end_matches('/').to_owned(),
            trading_url: trading_url.into().trim_end_matches('/').to_owned(),
            key_id: key_id.into(),
            secret_key: secret_key.into(),
            fetcher,
        }
    }

    /// Build a client with credentials read from the environment variables
    /// named in `config`.
    pub fn from_config(config: &MarketDataConfig) -> Result<Self, Report<MarketDataError>> {
        let key_id = read_env(&config.api_key_env)?;
        let secret_key = read_env(&config.secret_key_env)?;
        Ok(Self::new(
            config.data_url.clone(),
            config.trading_url.clone(),
            key_id,
            secret_key,
            RateLimitedFetcher::from_config(config),
        ))
    }

    async fn get(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<reqwest::Response, Report<MarketDataError>> {
        self.fetcher
            .send(|| {
                self.client
                    .get(url)
                    .header("APCA-API-KEY-ID", &self.key_id)
                    .header("APCA-API-SECRET-KEY", &self.secret_key)
                    .query(query)
                    .send()
            })
            .await
            .change_context(MarketDataError::Request {
                provider: PROVIDER.into(),
            })
            .attach_with(|| format!("url: {url}"))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, Report<MarketDataError>> {
        let response = self.get(url, query).await?;
        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(Report::new(MarketDataError::RateLimited {
                provider: PROVIDER.into(),
            })
            .attach(format!("url: {url}")));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Report::new(MarketDataError::Status {
                provider: PROVIDER.into(),
                status: status.as_u16(),
            })
            .attach(format!("body: {body}")));
        }

        response
            .json()
            .await
            .change_context(MarketDataError::ResponseParse {
                provider: PROVIDER.into(),
            })
    }
}

impl MarketData for AlpacaClient {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn fetch_bars(
        &self,
        symbol: &str,
        timeframe: TimeFrame,
        query: BarsQuery,
    ) -> BoxFuture<'_, Result<Vec<Bar>, Report<MarketDataError>>> {
        let symbol = symbol.to_owned();
        Box::pin(async move {
            let (start, end) = bar_window(Utc::now(), query.days);
            let mut params = vec![
                ("timeframe", timeframe.as_str().to_owned()),
                ("start", start),
                ("end", end),
                ("limit", query.limit.to_string()),
            ];

            let raw = if is_crypto(&symbol) {
                params.push(("symbols", symbol.clone()));
                let url = format!("{}/v1beta3/crypto/us/bars", self.data_url);
                let body: CryptoBarsResponse = self.get_json(&url, &params).await?;
                body.bars
                    .and_then(|mut by_symbol| by_symbol.remove(&symbol))
                    .unwrap_or_default()
            } else {
                let url = format!("{}/v2/stocks/{}/bars", self.data_url, symbol);
                let body: StockBarsResponse = self.get_json(&url, &params).await?;
                body.bars.unwrap_or_default()
            };

            debug!(
                symbol = %symbol,
                timeframe = %timeframe,
                count = raw.len(),
                "fetched bars"
            );
            Ok(raw.into_iter().map(AlpacaBar::into_bar).collect())
        })
    }

    fn fetch_latest_price(
        &self,
        symbol: &str,
    ) -> BoxFuture<'_, Result<Option<f64>, Report<MarketDataError>>> {
        let symbol = symbol.to_owned();
        Box::pin(async move {
            let url = format!("{}/v2/stocks/{}/trades/latest", self.data_url, symbol);
            let response = self.get(&url, &[]).await?;
            if !response.status().is_success() {
                debug!(
                    symbol = %symbol,
                    status = response.status().as_u16(),
                    "latest trade unavailable"
                );
                return Ok(None);
            }

            let body: LatestTradeResponse =
                response
                    .json()
                    .await
                    .change_context(MarketDataError::ResponseParse {
                        provider: PROVIDER.into(),
                    })?;
            Ok(body.trade.and_then(|t| t.p))
        })
    }
}

impl MarketClock for AlpacaClient {
    fn fetch_market_open(&self) -> BoxFuture<'_, Result<bool, Report<MarketDataError>>> {
        Box::pin(async move {
            let url = format!("{}/v2/clock", self.trading_url);
            let clock: ClockResponse = self.get_json(&url, &[]).await?;
            debug!(is_open = clock.is_open, "market clock");
            Ok(clock.is_open)
        })
    }
}

/// Crypto pairs (`ETH/USD`) and the two legacy unslashed tickers use the crypto API.
pub fn is_crypto(symbol: &str) -> bool {
    let symbol = symbol.trim().to_ascii_uppercase();
    symbol.contains('/') || symbol == "BTCUSD" || symbol == "ETHUSD"
}

/// Query window: `days` back (at least one) up to an hour ago.
fn bar_window(now: DateTime<Utc>, days: u32) -> (String, String) {
    let start = now - ChronoDuration::days(i64::from(days.max(1)));
    let end = now - ChronoDuration::hours(1);
    (format_timestamp(start), format_timestamp(end))
}

fn format_timestamp(time: DateTime<Utc>) -> String {
    time.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

fn read_env(name: &str) -> Result<String, Report<MarketDataError>> {
    std::env::var(name).change_context(MarketDataError::Credentials {
        name: name.to_owned(),
    })
}

// ---------------------------------------------------------------------------
// Alpaca API response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct AlpacaBar {
    t: DateTime<Utc>,
    o: f64,
    h: f64,
    l: f64,
    c: f64,
    v: f64,
}

impl AlpacaBar {
    fn into_bar(self) -> Bar {
        Bar {
            time: self.t,
            open: self.o,
            high: self.h,
            low: self.l,
            close: self.c,
            volume: self.v,
        }
    }
}

#[derive(Debug, Deserialize)]
struct StockBarsResponse {
    #[serde(default)]
    bars: Option<Vec<AlpacaBar>>,
}

#[derive(Debug, Deserialize)]
struct CryptoBarsResponse {
    #[serde(default)]
    bars: Option<HashMap<String, Vec<AlpacaBar>>>,
}

#[derive(Debug, Deserialize)]
struct ClockResponse {
    is_open: bool,
}

#[derive(Debug, Deserialize)]
struct LatestTradeResponse {
    trade: Option<LatestTrade>,
}

#[derive(Debug, Deserialize)]
struct LatestTrade {
    p: Option<f64>,
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn crypto_detection() {
        assert!(is_crypto("ETH/USD"));
        assert!(is_crypto("btcusd"));
        assert!(is_crypto("ETHUSD"));
        assert!(!is_crypto("AAPL"));
        assert!(!is_crypto("BRK.B"));
    }

    #[test]
    fn window_spans_days_back_to_an_hour_ago() {
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 12, 30, 45).unwrap();
        let (start, end) = bar_window(now, 60);
        assert_eq!(start, "2024-01-10T12:30:45Z");
        assert_eq!(end, "2024-03-10T11:30:45Z");
    }

    #[test]
    fn window_uses_at_least_one_day() {
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap();
        let (start, _) = bar_window(now, 0);
        assert_eq!(start, "2024-03-09T00:00:00Z");
    }

    #[test]
    fn stock_bars_response_parses() {
        let json = r#"{
            "bars": [
                {"t": "2024-01-02T05:00:00Z", "o": 187.15, "h": 188.44, "l": 183.885, "c": 185.64, "v": 82488700, "n": 1009074, "vw": 185.9}
            ],
            "symbol": "AAPL",
            "next_page_token": null
        }"#;
        let body: StockBarsResponse = serde_json::from_str(json).unwrap();
        let bars: Vec<Bar> = body.bars.unwrap().into_iter().map(AlpacaBar::into_bar).collect();
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].close, 185.64);
        assert_eq!(bars[0].volume, 82_488_700.0);
        assert_eq!(
            bars[0].time,
            Utc.with_ymd_and_hms(2024, 1, 2, 5, 0, 0).unwrap()
        );
    }

    #[test]
    fn stock_bars_null_means_no_bars() {
        let body: StockBarsResponse =
            serde_json::from_str(r#"{"bars": null, "symbol": "XYZ"}"#).unwrap();
        assert!(body.bars.unwrap_or_default().is_empty());
    }

    #[test]
    fn crypto_bars_response_is_keyed_by_symbol() {
        let json = r#"{
            "bars": {
                "ETH/USD": [
                    {"t": "2024-01-02T00:00:00Z", "o": 2350.1, "h": 2400.0, "l": 2300.5, "c": 2380.2, "v": 12.5}
                ]
            },
            "next_page_token": null
        }"#;
        let body: CryptoBarsResponse = serde_json::from_str(json).unwrap();
        let bars = body.bars.unwrap().remove("ETH/USD").unwrap();
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].c, 2380.2);
    }

    #[test]
    fn latest_trade_price_is_optional() {
        let json = r#"{"symbol": "AAPL", "trade": {"p": 189.5, "s": 100}}"#;
        let body: LatestTradeResponse = serde_json::from_str(json).unwrap();
        assert_eq!(body.trade.and_then(|t| t.p), Some(189.5));

        let body: LatestTradeResponse = serde_json::from_str(r#"{"symbol": "AAPL"}"#).unwrap();
        assert!(body.trade.is_none());
    }

    #[test]
    fn clock_response_parses() {
        let json = r#"{
            "timestamp": "2024-03-08T10:12:05.123-05:00",
            "is_open": false,
            "next_open": "2024-03-08T09:30:00-05:00",
            "next_close": "2024-03-08T16:00:00-05:00"
        }"#;
        let clock: ClockResponse = serde_json::from_str(json).unwrap();
        assert!(!clock.is_open);
    }

    #[tokio::test]
    #[ignore = "requires network access and Alpaca credentials"]
    async fn fetch_daily_bars_from_alpaca() {
        let client = AlpacaClient::from_config(&MarketDataConfig::default()).unwrap();
        let bars = client
            .fetch_bars("AAPL", TimeFrame::Day1, BarsQuery { days: 30, limit: 50 })
            .await
            .unwrap();
        assert!(!bars.is_empty());
        assert!(bars.windows(2).all(|w| w[0].time < w[1].time));
    }
}

pub mod alpaca;
pub mod fetch;

use error_stack::Report;
use futures::future::BoxFuture;

use crate::config::BarsQuery;
use crate::error::MarketDataError;
use crate::model::{Bar, TimeFrame};

/// Source of OHLCV history and latest trade prices.
///
/// Uses `BoxFuture` (from `futures` crate) instead of `async fn` in trait
/// to keep the trait object-safe (`dyn MarketData`).
pub trait MarketData: Send + Sync {
    fn name(&self) -> &str;

    /// Fetch bars for `symbol`, oldest first.
    ///
    /// A throttled response that exhausts the retry budget surfaces as
    /// `MarketDataError::RateLimited`; other non-2xx responses as
    /// `MarketDataError::Status` with the body attached.
    fn fetch_bars(
        &self,
        symbol: &str,
        timeframe: TimeFrame,
        query: BarsQuery,
    ) -> BoxFuture<'_, Result<Vec<Bar>, Report<MarketDataError>>>;

    /// Latest trade price, or `None` when the provider does not offer one.
    fn fetch_latest_price(
        &self,
        symbol: &str,
    ) -> BoxFuture<'_, Result<Option<f64>, Report<MarketDataError>>>;
}

/// Exchange session state, consulted before scheduled sweeps.
pub trait MarketClock: Send + Sync {
    /// Whether the market is open right now.
    fn fetch_market_open(&self) -> BoxFuture<'_, Result<bool, Report<MarketDataError>>>;
}

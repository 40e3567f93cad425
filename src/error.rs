use derive_more::{Display, Error};

#[derive(Debug, Display, Error)]
pub enum ConfigError {
    #[display("failed to read config file")]
    ReadFile,
    #[display("failed to parse config: {reason}")]
    Parse { reason: String },
    #[display("invalid config: {field}")]
    Validation { field: String },
}

#[derive(Debug, Display, Error)]
pub enum IndicatorError {
    #[display("insufficient data: need {required}, got {available}")]
    InsufficientData { required: usize, available: usize },
    #[display("invalid parameter: {name}")]
    InvalidParameter { name: String },
}

#[derive(Debug, Display, Error)]
pub enum MarketDataError {
    #[display("request to {provider} failed")]
    Request { provider: String },
    #[display("{provider} responded with HTTP {status}")]
    Status { provider: String, status: u16 },
    #[display("rate limit exceeded for {provider}")]
    RateLimited { provider: String },
    #[display("failed to parse response from {provider}")]
    ResponseParse { provider: String },
    #[display("missing credentials: {name}")]
    Credentials { name: String },
}

#[derive(Debug, Display, Error)]
pub enum ReasoningError {
    #[display("reasoning request failed")]
    Request,
    #[display("reasoning service responded with HTTP {status}")]
    Status { status: u16 },
    #[display("reasoning service rate limit exceeded")]
    RateLimited,
    #[display("failed to parse reasoning service response")]
    ResponseParse,
    #[display("missing credentials: {name}")]
    Credentials { name: String },
}

#[derive(Debug, Display, Error)]
pub enum StorageError {
    #[display("database migration failed")]
    Migration,
    #[display("failed to insert data")]
    Insert,
    #[display("failed to delete data")]
    Delete,
    #[display("failed to query data")]
    Query,
}

#[derive(Debug, Display, Error)]
pub enum ScanError {
    #[display("a scan is already running")]
    AlreadyRunning,
    #[display("candidate storage unavailable")]
    Storage,
}

/// Failure of a single (symbol, timeframe) step. Never aborts a sweep.
#[derive(Debug, Display, Error)]
pub enum StepError {
    #[display("failed to fetch bars for {symbol} {timeframe}")]
    Bars { symbol: String, timeframe: String },
    #[display("reasoning call failed for {symbol} {timeframe}")]
    Reasoning { symbol: String, timeframe: String },
}

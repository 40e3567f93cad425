use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use error_stack::{Report, ResultExt};
use serde::Deserialize;

use crate::error::ConfigError;
use crate::model::TimeFrame;

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "text".into()
}

fn default_data_dir() -> String {
    "./data".into()
}

fn default_assets() -> Vec<String> {
    vec!["AAPL".into(), "MSFT".into(), "SPY".into()]
}

fn default_timeframes() -> Vec<String> {
    vec!["1Day".into(), "1Hour".into()]
}

fn default_bar_days() -> u32 {
    60
}

fn default_bar_limit() -> u32 {
    300
}

fn default_reasoning_interval_ms() -> u64 {
    1500
}

fn default_interval_minutes() -> u64 {
    15
}

fn default_ma_periods() -> Vec<usize> {
    vec![20, 50, 200]
}

fn default_rsi_period() -> usize {
    14
}

fn default_rsi_oversold() -> f64 {
    30.0
}

fn default_rsi_overbought() -> f64 {
    70.0
}

fn default_data_url() -> String {
    "https://data.alpaca.markets".into()
}

fn default_trading_url() -> String {
    "https://paper-api.alpaca.markets".into()
}

fn default_alpaca_key_env() -> String {
    "ALPACA_API_KEY".into()
}

fn default_alpaca_secret_env() -> String {
    "ALPACA_SECRET_KEY".into()
}

fn default_request_interval_ms() -> u64 {
    500
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_after_secs() -> u64 {
    65
}

fn default_reasoning_url() -> String {
    "https://api.openai.com".into()
}

fn default_openai_key_env() -> String {
    "OPENAI_API_KEY".into()
}

fn default_model() -> String {
    "gpt-4o-mini".into()
}

fn default_system_prompt() -> String {
    "You are a professional trader. You receive a trading summary (symbol, timeframe, entry, \
     200 MA trend, RSI, MACD, Bravo 9, moving averages), the full indicator snapshot and recent \
     OHLCV bars. The 200 MA gives the overall trend (above favors longs, below favors shorts), \
     Bravo 9 gives reversal potential, RSI and MACD give momentum. Recommend \"long\" or \
     \"short\" only on strong confluence, otherwise \"none\". Always give a brief \
     momentumPrediction. Output only valid JSON: recommendation, confidence, \
     momentumPrediction, positionSizeSuggestion, stopLoss, takeProfit, reasoning."
        .into()
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_step_ms() -> u64 {
    3000
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    pub general: GeneralConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub market_data: MarketDataConfig,
    #[serde(default)]
    pub reasoning: ReasoningConfig,
}

#[derive(Debug, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Accepted values: `"text"` | `"json"`
    #[serde(default = "default_log_format")]
    pub log_format: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

#[derive(Debug, Deserialize)]
pub struct ScanConfig {
    #[serde(default = "default_assets")]
    pub assets: Vec<String>,
    #[serde(default = "default_timeframes")]
    pub timeframes: Vec<String>,
    #[serde(default = "default_bar_days")]
    pub bar_days: u32,
    #[serde(default = "default_bar_limit")]
    pub bar_limit: u32,
    #[serde(default = "default_reasoning_interval_ms")]
    pub reasoning_interval_ms: u64,
    #[serde(default = "default_true")]
    pub scheduler_enabled: bool,
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u64,
    /// Scheduled sweeps only run while the exchange clock reports the market open.
    #[serde(default = "default_true")]
    pub market_hours_only: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            assets: default_assets(),
            timeframes: default_timeframes(),
            bar_days: default_bar_days(),
            bar_limit: default_bar_limit(),
            reasoning_interval_ms: default_reasoning_interval_ms(),
            scheduler_enabled: true,
            interval_minutes: default_interval_minutes(),
            market_hours_only: true,
        }
    }
}

/// Indicator parameters taken from configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StrategyConfig {
    #[serde(default = "default_ma_periods")]
    pub ma_periods: Vec<usize>,
    #[serde(default = "default_rsi_period")]
    pub rsi_period: usize,
    #[serde(default = "default_rsi_oversold")]
    pub rsi_oversold: f64,
    #[serde(default = "default_rsi_overbought")]
    pub rsi_overbought: f64,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            ma_periods: default_ma_periods(),
            rsi_period: default_rsi_period(),
            rsi_oversold: default_rsi_oversold(),
            rsi_overbought: default_rsi_overbought(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarketDataConfig {
    #[serde(default = "default_data_url")]
    pub data_url: String,
    /// Trading API base, paper or live; serves the market clock.
    #[serde(default = "default_trading_url")]
    pub trading_url: String,
    #[serde(default = "default_alpaca_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_alpaca_secret_env")]
    pub secret_key_env: String,
    #[serde(default = "default_request_interval_ms")]
    pub request_interval_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_after_secs")]
    pub default_retry_after_secs: u64,
}

impl Default for MarketDataConfig {
    fn default() -> Self {
        Self {
            data_url: default_data_url(),
            trading_url: default_trading_url(),
            api_key_env: default_alpaca_key_env(),
            secret_key_env: default_alpaca_secret_env(),
            request_interval_ms: default_request_interval_ms(),
            max_retries: default_max_retries(),
            default_retry_after_secs: default_retry_after_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReasoningConfig {
    #[serde(default = "default_reasoning_url")]
    pub base_url: String,
    #[serde(default = "default_openai_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    #[serde(default = "default_true")]
    pub log_responses: bool,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_step_ms")]
    pub backoff_step_ms: u64,
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            base_url: default_reasoning_url(),
            api_key_env: default_openai_key_env(),
            model: default_model(),
            system_prompt: default_system_prompt(),
            log_responses: true,
            max_attempts: default_max_attempts(),
            backoff_step_ms: default_backoff_step_ms(),
        }
    }
}

/// History window requested for every bar fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarsQuery {
    pub days: u32,
    pub limit: u32,
}

/// Immutable inputs of one sweep, taken before it starts.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanSettings {
    pub assets: Vec<String>,
    pub timeframes: Vec<TimeFrame>,
    pub strategy: StrategyConfig,
    pub bars: BarsQuery,
}

impl AppConfig {
    /// Snapshot the sweep inputs. Assumes `load` has validated the config.
    pub fn snapshot(&self) -> ScanSettings {
        let mut seen = HashSet::new();
        let timeframes = self
            .scan
            .timeframes
            .iter()
            .filter_map(|tf| TimeFrame::from_str(tf))
            .filter(|tf| seen.insert(*tf))
            .collect();

        let mut strategy = self.strategy.clone();
        if strategy.ma_periods.is_empty() {
            strategy.ma_periods = default_ma_periods();
        }

        ScanSettings {
            assets: self.scan.assets.clone(),
            timeframes,
            strategy,
            bars: BarsQuery {
                days: self.scan.bar_days,
                limit: self.scan.bar_limit,
            },
        }
    }

    pub fn reasoning_interval(&self) -> Duration {
        Duration::from_millis(self.scan.reasoning_interval_ms)
    }
}

/// Load, normalise and validate an `AppConfig` from a TOML file at `path`.
pub fn load(path: &Path) -> Result<AppConfig, Report<ConfigError>> {
    let content = std::fs::read_to_string(path)
        .change_context(ConfigError::ReadFile)
        .attach_with(|| format!("path: {}", path.display()))?;

    parse(&content)
}

pub fn parse(content: &str) -> Result<AppConfig, Report<ConfigError>> {
    let mut config: AppConfig = toml::from_str(content).change_context(ConfigError::Parse {
        reason: "invalid TOML syntax or schema mismatch".into(),
    })?;

    normalize_assets(&mut config);
    validate(&config)?;

    Ok(config)
}

fn is_valid_symbol(symbol: &str) -> bool {
    (1..=20).contains(&symbol.len())
        && symbol
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '.' || c == '/')
}

fn normalize_assets(config: &mut AppConfig) {
    let mut seen = HashSet::new();
    config.scan.assets = config
        .scan
        .assets
        .iter()
        .map(|raw| raw.trim().to_ascii_uppercase())
        .filter(|symbol| {
            let valid = is_valid_symbol(symbol);
            if !valid {
                tracing::warn!(symbol = %symbol, "dropping invalid asset symbol");
            }
            valid
        })
        .filter(|symbol| seen.insert(symbol.clone()))
        .collect();
}

fn validate(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    validate_log_format(config)?;
    validate_timeframes(config)?;
    validate_strategy(&config.strategy)?;
    validate_scan(config)?;
    Ok(())
}

fn validate_log_format(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    match config.general.log_format.as_str() {
        "text" | "json" => Ok(()),
        other => Err(Report::new(ConfigError::Validation {
            field: format!("general.log_format \"{other}\" must be \"text\" or \"json\""),
        })),
    }
}

fn validate_timeframes(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    for tf in &config.scan.timeframes {
        if TimeFrame::from_str(tf).is_none() {
            return Err(Report::new(ConfigError::Validation {
                field: format!("scan.timeframes: unknown timeframe \"{tf}\""),
            }));
        }
    }
    Ok(())
}

fn validate_strategy(strategy: &StrategyConfig) -> Result<(), Report<ConfigError>> {
    if strategy.ma_periods.contains(&0) {
        return Err(Report::new(ConfigError::Validation {
            field: "strategy.ma_periods: periods must be positive".into(),
        }));
    }
    if strategy.rsi_period == 0 {
        return Err(Report::new(ConfigError::Validation {
            field: "strategy.rsi_period must be > 0".into(),
        }));
    }
    if strategy.rsi_oversold >= strategy.rsi_overbought {
        return Err(Report::new(ConfigError::Validation {
            field: format!(
                "strategy.rsi_oversold ({}) must be below rsi_overbought ({})",
                strategy.rsi_oversold, strategy.rsi_overbought
            ),
        }));
    }
    Ok(())
}

fn validate_scan(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    if config.scan.bar_limit == 0 {
        return Err(Report::new(ConfigError::Validation {
            field: "scan.bar_limit must be > 0".into(),
        }));
    }
    if config.scan.interval_minutes == 0 {
        return Err(Report::new(ConfigError::Validation {
            field: "scan.interval_minutes must be > 0".into(),
        }));
    }
    if config.reasoning.max_attempts == 0 {
        return Err(Report::new(ConfigError::Validation {
            field: "reasoning.max_attempts must be > 0".into(),
        }));
    }
    Ok(())
}

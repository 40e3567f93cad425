mod config;
mod error;
mod indicator;
mod market_data;
mod model;
mod reasoning;
mod scan;
mod scheduler;
mod storage;
mod strategy;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use derive_more::{Display, Error};
use error_stack::{Report, ResultExt};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use config::{AppConfig, ScanSettings};
use market_data::MarketClock;
use market_data::alpaca::AlpacaClient;
use market_data::fetch::Pacer;
use reasoning::openai::OpenAiClient;
use scan::{ScanOutcome, Scanner};
use storage::CandidateStore;
use storage::sqlite::SqliteStorage;

const PROGRESS_LOG_INTERVAL: Duration = Duration::from_secs(5);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Display, Error)]
pub enum AppError {
    #[display("configuration error")]
    Config,
    #[display("storage error")]
    Storage,
    #[display("market data error")]
    MarketData,
    #[display("reasoning service error")]
    Reasoning,
    #[display("scan error")]
    Scan,
    #[display("runtime error")]
    Runtime,
}

#[derive(Parser)]
#[command(
    name = "confluence-scanner",
    about = "Multi-indicator confluence scanner with AI trade recommendations"
)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a single sweep and print its results as JSON
    Scan {
        /// Compute indicators only; no reasoning calls and no persistence
        #[arg(long)]
        probe: bool,
    },
    /// Run sweeps on the configured interval until Ctrl-C
    Run,
    /// Print the persisted candidates as JSON
    Candidates {
        #[arg(short, long, default_value_t = 50)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() {
    if let Err(report) = run().await {
        eprintln!("{report:?}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Report<AppError>> {
    let cli = Cli::parse();
    let config = config::load(Path::new(&cli.config)).change_context(AppError::Config)?;

    init_tracing(&config);

    match cli.command {
        Command::Scan { probe } => {
            let scanner = build_scanner(&config, alpaca_client(&config)?, probe).await?;
            let outcome = scan_once(&scanner, &config.snapshot(), probe).await?;
            print_json(&outcome)
        }
        Command::Run => run_scheduler(config).await,
        Command::Candidates { limit } => {
            let storage = open_storage(&config).await?;
            let candidates = storage
                .list_candidates(limit)
                .await
                .change_context(AppError::Storage)?;
            let last_scanned_at = storage
                .last_scanned_at()
                .await
                .change_context(AppError::Storage)?;
            print_json(&serde_json::json!({
                "lastScannedAt": last_scanned_at,
                "candidates": candidates,
            }))
        }
    }
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::new(&config.general.log_level);
    match config.general.log_format.as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .init();
        }
        _ => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }
}

async fn open_storage(config: &AppConfig) -> Result<SqliteStorage, Report<AppError>> {
    let data_dir = &config.general.data_dir;
    std::fs::create_dir_all(data_dir)
        .change_context(AppError::Storage)
        .attach_with(|| format!("data_dir: {data_dir}"))?;

    let db_path = format!("{data_dir}/confluence-scanner.db");
    SqliteStorage::open(Path::new(&db_path))
        .await
        .change_context(AppError::Storage)
}

fn alpaca_client(config: &AppConfig) -> Result<Arc<AlpacaClient>, Report<AppError>> {
    AlpacaClient::from_config(&config.market_data)
        .map(Arc::new)
        .change_context(AppError::MarketData)
}

async fn build_scanner(
    config: &AppConfig,
    market_data: Arc<AlpacaClient>,
    probe: bool,
) -> Result<Scanner, Report<AppError>> {
    let storage = open_storage(config).await?;

    // Probe sweeps never reach the reasoning service, so no key is required.
    let reasoning = if probe {
        OpenAiClient::new(&config.reasoning, String::new())
    } else {
        OpenAiClient::from_config(&config.reasoning).change_context(AppError::Reasoning)?
    };

    Ok(Scanner::new(
        market_data,
        Arc::new(reasoning),
        Arc::new(storage),
        Pacer::new(config.reasoning_interval()),
    ))
}

/// Run one sweep, logging progress until it finishes.
async fn scan_once(
    scanner: &Scanner,
    settings: &ScanSettings,
    probe: bool,
) -> Result<ScanOutcome, Report<AppError>> {
    let sweep = scanner.run_scan(settings, probe);
    tokio::pin!(sweep);

    let mut ticker = tokio::time::interval(PROGRESS_LOG_INTERVAL);
    ticker.tick().await;

    loop {
        tokio::select! {
            result = &mut sweep => return result.change_context(AppError::Scan),
            _ = ticker.tick() => {
                let progress = scanner.progress();
                info!(
                    current = progress.current,
                    total = progress.total,
                    symbol = progress.symbol.as_deref().unwrap_or("-"),
                    timeframe = ?progress.timeframe,
                    "scan in progress"
                );
            }
        }
    }
}

async fn run_scheduler(config: AppConfig) -> Result<(), Report<AppError>> {
    if !config.scan.scheduler_enabled {
        warn!("scheduler disabled in config; nothing to do");
        return Ok(());
    }

    let alpaca = alpaca_client(&config)?;
    let clock = if config.scan.market_hours_only {
        Some(Arc::clone(&alpaca) as Arc<dyn MarketClock>)
    } else {
        None
    };
    let scanner = Arc::new(build_scanner(&config, alpaca, false).await?);
    let period = Duration::from_secs(config.scan.interval_minutes * 60);
    let cancel = CancellationToken::new();

    let snapshot_source = Arc::new(config);
    let handle = tokio::spawn(scheduler::run_periodic(
        scanner,
        clock,
        period,
        move || snapshot_source.snapshot(),
        cancel.clone(),
    ));

    tokio::signal::ctrl_c()
        .await
        .change_context(AppError::Runtime)?;

    info!("ctrl+c received, shutting down");
    cancel.cancel();

    if tokio::time::timeout(SHUTDOWN_GRACE, handle).await.is_err() {
        warn!("sweep still in flight at shutdown, abandoning it");
    }

    info!("shutdown complete");
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), Report<AppError>> {
    let json = serde_json::to_string_pretty(value).change_context(AppError::Runtime)?;
    println!("{json}");
    Ok(())
}

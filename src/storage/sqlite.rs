use chrono::{DateTime, Utc};
use error_stack::{Report, ResultExt};
use futures::future::BoxFuture;
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqliteJournalMode},
};
use std::path::Path;
use std::str::FromStr;

use crate::error::StorageError;
use crate::indicator::bravo9::Bravo9Signal;
use crate::model::{Candidate, TimeFrame, TradeSide, Trend};
use crate::storage::CandidateStore;

const LAST_SCANNED_AT: &str = "last_scanned_at";

#[derive(sqlx::FromRow)]
struct CandidateRow {
    sweep_id: String,
    symbol: String,
    timeframe: String,
    side: String,
    confidence: f64,
    suggested_size: Option<f64>,
    stop_loss: Option<f64>,
    take_profit: Option<f64>,
    reasoning: String,
    current_price: f64,
    rsi: Option<f64>,
    bravo9_signal: Option<String>,
    bravo9: Option<String>,
    trend_200: Option<String>,
    macd_signal: Option<String>,
    momentum_prediction: Option<String>,
    scanned_at: String,
}

pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Open (or create) a SQLite database at `path` and run migrations.
    pub async fn open(path: &Path) -> Result<Self, Report<StorageError>> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .change_context(StorageError::Migration)
                .attach_with(|| format!("cannot create data directory: {}", parent.display()))?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .change_context(StorageError::Migration)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePool::connect_with(opts)
            .await
            .change_context(StorageError::Migration)
            .attach_with(|| format!("database path: {}", path.display()))?;

        Self::migrate(pool).await
    }

    /// A private in-memory database, used by tests and dry runs.
    pub async fn in_memory() -> Result<Self, Report<StorageError>> {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:")
            .change_context(StorageError::Migration)?
            .create_if_missing(true);
        // Each connection to `:memory:` is a separate database.
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(opts)
            .await
            .change_context(StorageError::Migration)?;

        Self::migrate(pool).await
    }

    async fn migrate(pool: SqlitePool) -> Result<Self, Report<StorageError>> {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .change_context(StorageError::Migration)?;

        Ok(Self { pool })
    }
}

impl CandidateStore for SqliteStorage {
    fn clear_candidates(&self) -> BoxFuture<'_, Result<u64, Report<StorageError>>> {
        Box::pin(async move {
            let result = sqlx::query("DELETE FROM candidates")
                .execute(&self.pool)
                .await
                .change_context(StorageError::Delete)?;
            Ok(result.rows_affected())
        })
    }

    fn insert_candidate(
        &self,
        candidate: &Candidate,
    ) -> BoxFuture<'_, Result<(), Report<StorageError>>> {
        let c = candidate.clone();
        Box::pin(async move {
            let bravo9 = c
                .bravo9
                .as_ref()
                .map(serde_json::to_string)
                .transpose()
                .change_context(StorageError::Insert)?;

            sqlx::query(
                "INSERT INTO candidates \
                 (sweep_id, symbol, timeframe, side, confidence, suggested_size, stop_loss, \
                  take_profit, reasoning, current_price, rsi, bravo9_signal, bravo9, trend_200, \
                  macd_signal, momentum_prediction, scanned_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&c.sweep_id)
            .bind(&c.symbol)
            .bind(c.timeframe.as_str())
            .bind(c.side.as_str())
            .bind(c.confidence)
            .bind(c.suggested_size)
            .bind(c.stop_loss)
            .bind(c.take_profit)
            .bind(&c.reasoning)
            .bind(c.current_price)
            .bind(c.rsi)
            .bind(c.bravo9_signal.map(Bravo9Signal::as_str))
            .bind(bravo9)
            .bind(c.trend_200.map(Trend::as_str))
            .bind(c.macd_signal.map(Trend::as_str))
            .bind(&c.momentum_prediction)
            .bind(c.scanned_at.to_rfc3339())
            .execute(&self.pool)
            .await
            .change_context(StorageError::Insert)
            .attach_with(|| format!("symbol: {}, timeframe: {}", c.symbol, c.timeframe))?;
            Ok(())
        })
    }

    fn list_candidates(
        &self,
        limit: usize,
    ) -> BoxFuture<'_, Result<Vec<Candidate>, Report<StorageError>>> {
        Box::pin(async move {
            let rows: Vec<CandidateRow> = sqlx::query_as(
                "SELECT sweep_id, symbol, timeframe, side, confidence, suggested_size, stop_loss, \
                 take_profit, reasoning, current_price, rsi, bravo9_signal, bravo9, trend_200, \
                 macd_signal, momentum_prediction, scanned_at \
                 FROM candidates ORDER BY scanned_at DESC, id ASC LIMIT ?",
            )
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .change_context(StorageError::Query)?;

            rows.into_iter().map(map_candidate_row).collect()
        })
    }

    fn record_last_scanned_at(
        &self,
        at: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<(), Report<StorageError>>> {
        Box::pin(async move {
            sqlx::query(
                "INSERT INTO scan_state (key, value) VALUES (?, ?) \
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            )
            .bind(LAST_SCANNED_AT)
            .bind(at.to_rfc3339())
            .execute(&self.pool)
            .await
            .change_context(StorageError::Insert)?;
            Ok(())
        })
    }

    fn last_scanned_at(
        &self,
    ) -> BoxFuture<'_, Result<Option<DateTime<Utc>>, Report<StorageError>>> {
        Box::pin(async move {
            let row: Option<(String,)> =
                sqlx::query_as("SELECT value FROM scan_state WHERE key = ?")
                    .bind(LAST_SCANNED_AT)
                    .fetch_optional(&self.pool)
                    .await
                    .change_context(StorageError::Query)?;

            Ok(row.and_then(|(ts,)| parse_time_utc(&ts)))
        })
    }
}

fn map_candidate_row(row: CandidateRow) -> Result<Candidate, Report<StorageError>> {
    let timeframe = TimeFrame::from_str(&row.timeframe).ok_or_else(|| {
        Report::new(StorageError::Query).attach(format!("unknown timeframe: {}", row.timeframe))
    })?;
    let side = TradeSide::from_str(&row.side).ok_or_else(|| {
        Report::new(StorageError::Query).attach(format!("unknown side: {}", row.side))
    })?;
    let scanned_at = parse_time_utc(&row.scanned_at).ok_or_else(|| {
        Report::new(StorageError::Query).attach(format!("bad scanned_at: {}", row.scanned_at))
    })?;

    Ok(Candidate {
        sweep_id: row.sweep_id,
        symbol: row.symbol,
        timeframe,
        side,
        confidence: row.confidence,
        suggested_size: row.suggested_size,
        stop_loss: row.stop_loss,
        take_profit: row.take_profit,
        reasoning: row.reasoning,
        current_price: row.current_price,
        rsi: row.rsi,
        bravo9_signal: row.bravo9_signal.as_deref().and_then(Bravo9Signal::from_str),
        bravo9: row.bravo9.as_deref().and_then(|json| serde_json::from_str(json).ok()),
        trend_200: row.trend_200.as_deref().and_then(Trend::from_str),
        macd_signal: row.macd_signal.as_deref().and_then(Trend::from_str),
        momentum_prediction: row.momentum_prediction,
        scanned_at,
    })
}

fn parse_time_utc(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

pub mod progress;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use error_stack::{Report, ResultExt};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::ScanSettings;
use crate::error::{ScanError, StepError};
use crate::indicator::{IndicatorBundle, compute_indicators};
use crate::market_data::MarketData;
use crate::market_data::fetch::Pacer;
use crate::model::{Candidate, Recommendation, TimeFrame};
use crate::reasoning::{ReasoningRequest, ReasoningService};
use crate::storage::CandidateStore;
use crate::strategy::{Qualification, qualify};

pub use progress::{ProgressHandle, ScanProgress};

/// Indicators computed for one step of a probe sweep.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeResult {
    pub symbol: String,
    pub timeframe: TimeFrame,
    pub bar_count: usize,
    pub indicators: IndicatorBundle,
}

/// A step that failed and was skipped.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepFailure {
    pub symbol: String,
    pub timeframe: TimeFrame,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanResults {
    Probe(Vec<ProbeResult>),
    Candidates(Vec<Candidate>),
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanOutcome {
    pub sweep_id: String,
    pub scanned_at: DateTime<Utc>,
    pub results: ScanResults,
    pub step_errors: Vec<StepFailure>,
}

/// What a single (symbol, timeframe) step produced.
#[derive(Debug)]
pub enum StepOutcome {
    /// Fewer than two bars came back.
    NotEnoughBars(usize),
    Probed(ProbeResult),
    Rejected(Qualification),
    /// The reasoning service recommended no trade.
    NoTrade,
    /// A candidate ready to persist.
    Candidate(Box<Candidate>),
}

/// Inputs shared by every step of one sweep.
struct Sweep<'a> {
    id: &'a str,
    started_at: DateTime<Utc>,
    settings: &'a ScanSettings,
    probe_only: bool,
}

/// Runs sweeps over the configured assets and timeframes.
pub struct Scanner {
    market_data: Arc<dyn MarketData>,
    reasoning: Arc<dyn ReasoningService>,
    store: Arc<dyn CandidateStore>,
    reasoning_pacer: Pacer,
    progress: ProgressHandle,
}

impl Scanner {
    pub fn new(
        market_data: Arc<dyn MarketData>,
        reasoning: Arc<dyn ReasoningService>,
        store: Arc<dyn CandidateStore>,
        reasoning_pacer: Pacer,
    ) -> Self {
        Self {
            market_data,
            reasoning,
            store,
            reasoning_pacer,
            progress: ProgressHandle::default(),
        }
    }

    pub fn progress(&self) -> ScanProgress {
        self.progress.snapshot()
    }

    #[cfg(test)]
    pub fn progress_handle(&self) -> ProgressHandle {
        self.progress.clone()
    }

    /// Run one sweep over `settings.assets` x `settings.timeframes`.
    ///
    /// Per-step failures are collected into `step_errors`; only storage
    /// failures abort the sweep. A second sweep requested while one is in
    /// flight fails with `ScanError::AlreadyRunning`.
    pub async fn run_scan(
        &self,
        settings: &ScanSettings,
        probe_only: bool,
    ) -> Result<ScanOutcome, Report<ScanError>> {
        let total = settings.assets.len() * settings.timeframes.len();
        let guard = self
            .progress
            .begin(probe_only, total)
            .ok_or_else(|| Report::new(ScanError::AlreadyRunning))?;

        let sweep_id = Uuid::new_v4().to_string();
        let sweep = Sweep {
            id: &sweep_id,
            started_at: Utc::now(),
            settings,
            probe_only,
        };
        info!(
            sweep_id = %sweep_id,
            provider = self.market_data.name(),
            probe_only,
            assets = settings.assets.len(),
            timeframes = settings.timeframes.len(),
            "sweep started"
        );

        if !probe_only {
            let removed = self
                .store
                .clear_candidates()
                .await
                .change_context(ScanError::Storage)?;
            debug!(sweep_id = %sweep_id, removed, "cleared previous candidates");
        }

        let mut probes = Vec::new();
        let mut candidates = Vec::new();
        let mut step_errors = Vec::new();

        for (symbol_index, symbol) in settings.assets.iter().enumerate() {
            let latest_price = self.latest_price(symbol).await;

            for (tf_index, &timeframe) in settings.timeframes.iter().enumerate() {
                guard.step(
                    symbol_index * settings.timeframes.len() + tf_index,
                    symbol,
                    timeframe,
                );

                match self.run_step(&sweep, symbol, timeframe, latest_price).await {
                    Ok(StepOutcome::Probed(probe)) => probes.push(probe),
                    Ok(StepOutcome::Candidate(candidate)) => {
                        self.store
                            .insert_candidate(&candidate)
                            .await
                            .change_context(ScanError::Storage)?;
                        info!(
                            sweep_id = %sweep_id,
                            symbol = %symbol,
                            timeframe = %timeframe,
                            side = %candidate.side,
                            confidence = candidate.confidence,
                            "candidate stored"
                        );
                        candidates.push(*candidate);
                    }
                    Ok(StepOutcome::NotEnoughBars(bars)) => {
                        debug!(
                            symbol = %symbol,
                            timeframe = %timeframe,
                            bars,
                            "not enough bars, skipped"
                        );
                    }
                    Ok(StepOutcome::Rejected(qualification)) => {
                        debug!(
                            symbol = %symbol,
                            timeframe = %timeframe,
                            %qualification,
                            "not escalated"
                        );
                    }
                    Ok(StepOutcome::NoTrade) => {
                        debug!(
                            symbol = %symbol,
                            timeframe = %timeframe,
                            "no trade recommended"
                        );
                    }
                    Err(report) => {
                        warn!(
                            sweep_id = %sweep_id,
                            symbol = %symbol,
                            timeframe = %timeframe,
                            error = ?report,
                            "scan step failed"
                        );
                        step_errors.push(StepFailure {
                            symbol: symbol.clone(),
                            timeframe,
                            message: format!("{report:#}"),
                        });
                    }
                }
            }
        }

        drop(guard);

        // Candidates are already persisted, so the outcome is returned either way.
        let scanned_at = Utc::now();
        if let Err(report) = self.store.record_last_scanned_at(scanned_at).await {
            warn!(sweep_id = %sweep_id, error = ?report, "failed to record last scanned time");
        }

        let results = if probe_only {
            ScanResults::Probe(probes)
        } else {
            ScanResults::Candidates(candidates)
        };
        info!(
            sweep_id = %sweep_id,
            steps = total,
            failed = step_errors.len(),
            "sweep finished"
        );

        Ok(ScanOutcome {
            sweep_id,
            scanned_at,
            results,
            step_errors,
        })
    }

    /// Best effort; failures fall back to the bundle's own price.
    async fn latest_price(&self, symbol: &str) -> Option<f64> {
        match self.market_data.fetch_latest_price(symbol).await {
            Ok(price) => price,
            Err(report) => {
                debug!(symbol = %symbol, error = ?report, "latest price unavailable");
                None
            }
        }
    }

    async fn run_step(
        &self,
        sweep: &Sweep<'_>,
        symbol: &str,
        timeframe: TimeFrame,
        latest_price: Option<f64>,
    ) -> Result<StepOutcome, Report<StepError>> {
        let bars = self
            .market_data
            .fetch_bars(symbol, timeframe, sweep.settings.bars)
            .await
            .change_context_lazy(|| StepError::Bars {
                symbol: symbol.to_owned(),
                timeframe: timeframe.to_string(),
            })?;

        if bars.len() < 2 {
            return Ok(StepOutcome::NotEnoughBars(bars.len()));
        }
        let Some(indicators) = compute_indicators(&bars, &sweep.settings.strategy) else {
            return Ok(StepOutcome::NotEnoughBars(bars.len()));
        };

        if sweep.probe_only {
            return Ok(StepOutcome::Probed(ProbeResult {
                symbol: symbol.to_owned(),
                timeframe,
                bar_count: bars.len(),
                indicators,
            }));
        }

        let qualification = qualify(&indicators);
        if !qualification.qualifies() {
            return Ok(StepOutcome::Rejected(qualification));
        }
        debug!(symbol = %symbol, timeframe = %timeframe, %qualification, "escalating to reasoning");

        self.reasoning_pacer.until_ready().await;
        let request = ReasoningRequest {
            symbol,
            timeframe,
            bars: &bars,
            indicators: &indicators,
            current_price: latest_price,
        };
        let recommendation = self
            .reasoning
            .recommend(request)
            .await
            .change_context_lazy(|| StepError::Reasoning {
                symbol: symbol.to_owned(),
                timeframe: timeframe.to_string(),
            })?;

        let current_price = request.entry_price();
        Ok(build_candidate(sweep, symbol, timeframe, current_price, &indicators, recommendation)
            .map_or(StepOutcome::NoTrade, |c| StepOutcome::Candidate(Box::new(c))))
    }
}

fn build_candidate(
    sweep: &Sweep<'_>,
    symbol: &str,
    timeframe: TimeFrame,
    current_price: f64,
    indicators: &IndicatorBundle,
    recommendation: Recommendation,
) -> Option<Candidate> {
    let side = recommendation.recommendation.tradable()?;
    Some(Candidate {
        sweep_id: sweep.id.to_owned(),
        symbol: symbol.to_owned(),
        timeframe,
        side,
        confidence: recommendation.confidence,
        suggested_size: recommendation.position_size_suggestion,
        stop_loss: recommendation.stop_loss,
        take_profit: recommendation.take_profit,
        reasoning: recommendation.reasoning,
        current_price,
        rsi: indicators.rsi.map(|r| r.value),
        bravo9_signal: indicators.bravo9.map(|b| b.signal),
        bravo9: indicators.bravo9,
        trend_200: indicators.trend200.map(|t| t.trend),
        macd_signal: indicators.macd.map(|m| m.signal),
        momentum_prediction: recommendation.momentum_prediction,
        scanned_at: sweep.started_at,
    })
}

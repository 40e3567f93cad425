use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::ScanSettings;
use crate::error::ScanError;
use crate::market_data::MarketClock;
use crate::scan::{ScanResults, Scanner};

/// Run a full sweep every `period` until `cancel` fires.
///
/// The first sweep starts one period after the call. `snapshot` is taken
/// fresh for every sweep. With a `clock`, ticks where the market is closed or
/// the clock cannot be read are skipped. A running sweep is never interrupted;
/// cancellation takes effect at the next tick.
pub async fn run_periodic<F>(
    scanner: Arc<Scanner>,
    clock: Option<Arc<dyn MarketClock>>,
    period: Duration,
    snapshot: F,
    cancel: CancellationToken,
) where
    F: Fn() -> ScanSettings,
{
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!(period_secs = period.as_secs(), "scheduler started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        if let Some(clock) = &clock {
            match clock.fetch_market_open().await {
                Ok(true) => {}
                Ok(false) => {
                    info!("market closed, skipping scheduled sweep");
                    continue;
                }
                Err(report) => {
                    warn!(error = ?report, "market clock unavailable, skipping tick");
                    continue;
                }
            }
        }

        let settings = snapshot();
        info!("running scheduled sweep");
        match scanner.run_scan(&settings, false).await {
            Ok(outcome) => {
                let candidates = match &outcome.results {
                    ScanResults::Candidates(candidates) => candidates.len(),
                    ScanResults::Probe(_) => 0,
                };
                info!(
                    sweep_id = %outcome.sweep_id,
                    candidates,
                    failed_steps = outcome.step_errors.len(),
                    "scheduled sweep done"
                );
            }
            Err(report) if matches!(report.current_context(), ScanError::AlreadyRunning) => {
                warn!("previous sweep still running, skipping tick");
            }
            Err(report) => {
                error!(error = ?report, "scheduled sweep failed");
            }
        }
    }

    info!("scheduler stopped");
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::{DateTime, Utc};
    use error_stack::Report;
    use futures::future::BoxFuture;

    use super::*;
    use crate::config::{BarsQuery, StrategyConfig};
    use crate::error::{MarketDataError, ReasoningError, StorageError};
    use crate::market_data::MarketData;
    use crate::market_data::fetch::Pacer;
    use crate::model::{Bar, Candidate, Recommendation, TimeFrame};
    use crate::reasoning::{ReasoningRequest, ReasoningService};
    use crate::storage::CandidateStore;

    /// Collaborator that is never reached by an empty sweep.
    struct Unreachable;

    impl MarketData for Unreachable {
        fn name(&self) -> &str {
            "unreachable"
        }

        fn fetch_bars(
            &self,
            _symbol: &str,
            _timeframe: TimeFrame,
            _query: BarsQuery,
        ) -> BoxFuture<'_, Result<Vec<Bar>, Report<MarketDataError>>> {
            Box::pin(async {
                Err(Report::new(MarketDataError::Request {
                    provider: "none".into(),
                }))
            })
        }

        fn fetch_latest_price(
            &self,
            _symbol: &str,
        ) -> BoxFuture<'_, Result<Option<f64>, Report<MarketDataError>>> {
            Box::pin(async { Ok(None) })
        }
    }

    impl ReasoningService for Unreachable {
        fn recommend<'a>(
            &'a self,
            _request: ReasoningRequest<'a>,
        ) -> BoxFuture<'a, Result<Recommendation, Report<ReasoningError>>> {
            Box::pin(async { Err(Report::new(ReasoningError::Request)) })
        }
    }

    /// Clock that replays `answers`, then repeats the last one.
    struct ScriptedClock {
        answers: Vec<Option<bool>>,
        calls: AtomicUsize,
    }

    impl ScriptedClock {
        fn new(answers: &[Option<bool>]) -> Arc<Self> {
            Arc::new(Self {
                answers: answers.to_vec(),
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl MarketClock for ScriptedClock {
        fn fetch_market_open(&self) -> BoxFuture<'_, Result<bool, Report<MarketDataError>>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let answer = self.answers[call.min(self.answers.len() - 1)];
            Box::pin(async move {
                answer.ok_or_else(|| {
                    Report::new(MarketDataError::Status {
                        provider: "clock".into(),
                        status: 503,
                    })
                })
            })
        }
    }

    #[derive(Default)]
    struct CountingStore {
        sweeps: AtomicUsize,
    }

    impl CandidateStore for CountingStore {
        fn clear_candidates(&self) -> BoxFuture<'_, Result<u64, Report<StorageError>>> {
            Box::pin(async { Ok(0) })
        }

        fn insert_candidate(
            &self,
            _candidate: &Candidate,
        ) -> BoxFuture<'_, Result<(), Report<StorageError>>> {
            Box::pin(async { Ok(()) })
        }

        fn list_candidates(
            &self,
            _limit: usize,
        ) -> BoxFuture<'_, Result<Vec<Candidate>, Report<StorageError>>> {
            Box::pin(async { Ok(Vec::new()) })
        }

        fn record_last_scanned_at(
            &self,
            _at: DateTime<Utc>,
        ) -> BoxFuture<'_, Result<(), Report<StorageError>>> {
            self.sweeps.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Ok(()) })
        }

        fn last_scanned_at(
            &self,
        ) -> BoxFuture<'_, Result<Option<DateTime<Utc>>, Report<StorageError>>> {
            Box::pin(async { Ok(None) })
        }
    }

    fn empty_settings() -> ScanSettings {
        ScanSettings {
            assets: Vec::new(),
            timeframes: vec![TimeFrame::Day1],
            strategy: StrategyConfig::default(),
            bars: BarsQuery {
                days: 60,
                limit: 300,
            },
        }
    }

    #[tokio::test(start_paused = true)]
    async fn sweeps_once_per_period_until_cancelled() {
        let store = Arc::new(CountingStore::default());
        let scanner = Arc::new(Scanner::new(
            Arc::new(Unreachable),
            Arc::new(Unreachable),
            store.clone(),
            Pacer::disabled(),
        ));
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_periodic(
            scanner,
            None,
            Duration::from_secs(900),
            empty_settings,
            cancel.clone(),
        ));

        tokio::time::sleep(Duration::from_secs(899)).await;
        assert_eq!(store.sweeps.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(store.sweeps.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(900)).await;
        assert_eq!(store.sweeps.load(Ordering::SeqCst), 2);

        cancel.cancel();
        handle.await.unwrap();
        assert_eq!(store.sweeps.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn busy_scanner_skips_tick() {
        let store = Arc::new(CountingStore::default());
        let scanner = Arc::new(Scanner::new(
            Arc::new(Unreachable),
            Arc::new(Unreachable),
            store.clone(),
            Pacer::disabled(),
        ));
        let _busy = scanner.progress_handle().begin(false, 1).unwrap();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_periodic(
            scanner,
            None,
            Duration::from_secs(60),
            empty_settings,
            cancel.clone(),
        ));

        tokio::time::sleep(Duration::from_secs(130)).await;
        cancel.cancel();
        handle.await.unwrap();
        assert_eq!(store.sweeps.load(Ordering::SeqCst), 0);
    }

    fn counting_scanner(store: &Arc<CountingStore>) -> Arc<Scanner> {
        Arc::new(Scanner::new(
            Arc::new(Unreachable),
            Arc::new(Unreachable),
            store.clone(),
            Pacer::disabled(),
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn closed_market_means_no_sweeps() {
        let store = Arc::new(CountingStore::default());
        let clock = ScriptedClock::new(&[Some(false)]);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_periodic(
            counting_scanner(&store),
            Some(clock.clone() as Arc<dyn MarketClock>),
            Duration::from_secs(900),
            empty_settings,
            cancel.clone(),
        ));

        tokio::time::sleep(Duration::from_secs(3 * 900 + 1)).await;
        cancel.cancel();
        handle.await.unwrap();
        assert_eq!(clock.calls.load(Ordering::SeqCst), 3);
        assert_eq!(store.sweeps.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn sweeps_only_on_open_ticks_and_survives_clock_errors() {
        let store = Arc::new(CountingStore::default());
        let clock = ScriptedClock::new(&[None, Some(false), Some(true)]);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_periodic(
            counting_scanner(&store),
            Some(clock.clone() as Arc<dyn MarketClock>),
            Duration::from_secs(60),
            empty_settings,
            cancel.clone(),
        ));

        tokio::time::sleep(Duration::from_secs(121)).await;
        assert_eq!(store.sweeps.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(store.sweeps.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(60)).await;
        cancel.cancel();
        handle.await.unwrap();
        assert_eq!(clock.calls.load(Ordering::SeqCst), 4);
        assert_eq!(store.sweeps.load(Ordering::SeqCst), 2);
    }
}

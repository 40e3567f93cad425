use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;

use crate::model::TimeFrame;

/// Read-only view of the sweep in flight, if any.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanProgress {
    pub running: bool,
    pub indicator_only: bool,
    /// Zero-based index of the step being worked on; equals `total` once idle.
    pub current: usize,
    pub total: usize,
    pub symbol: Option<String>,
    pub timeframe: Option<TimeFrame>,
}

/// Shared progress record. Cloning yields another handle to the same record.
#[derive(Debug, Clone, Default)]
pub struct ProgressHandle {
    inner: Arc<Mutex<ScanProgress>>,
}

impl ProgressHandle {
    pub fn snapshot(&self) -> ScanProgress {
        self.lock().clone()
    }

    /// Claim the record for a new sweep of `total` steps.
    ///
    /// Returns `None` while another sweep holds it. The record returns to
    /// idle when the returned guard is dropped.
    pub fn begin(&self, indicator_only: bool, total: usize) -> Option<SweepGuard> {
        let mut progress = self.lock();
        if progress.running {
            return None;
        }
        *progress = ScanProgress {
            running: true,
            indicator_only,
            current: 0,
            total,
            symbol: None,
            timeframe: None,
        };
        Some(SweepGuard {
            handle: self.clone(),
        })
    }

    fn lock(&self) -> MutexGuard<'_, ScanProgress> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Exclusive ownership of the progress record for one sweep.
#[derive(Debug)]
pub struct SweepGuard {
    handle: ProgressHandle,
}

impl SweepGuard {
    pub fn step(&self, current: usize, symbol: &str, timeframe: TimeFrame) {
        let mut progress = self.handle.lock();
        progress.current = current;
        progress.symbol = Some(symbol.to_owned());
        progress.timeframe = Some(timeframe);
    }
}

impl Drop for SweepGuard {
    fn drop(&mut self) {
        let mut progress = self.handle.lock();
        progress.running = false;
        progress.current = progress.total;
        progress.symbol = None;
        progress.timeframe = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_by_default() {
        let handle = ProgressHandle::default();
        assert_eq!(handle.snapshot(), ScanProgress::default());
        assert!(!handle.snapshot().running);
    }

    #[test]
    fn begin_step_and_drop() {
        let handle = ProgressHandle::default();
        let guard = handle.begin(true, 6).unwrap();
        assert_eq!(
            handle.snapshot(),
            ScanProgress {
                running: true,
                indicator_only: true,
                current: 0,
                total: 6,
                symbol: None,
                timeframe: None,
            }
        );

        guard.step(4, "MSFT", TimeFrame::Hour1);
        let progress = handle.snapshot();
        assert_eq!(progress.current, 4);
        assert_eq!(progress.symbol.as_deref(), Some("MSFT"));
        assert_eq!(progress.timeframe, Some(TimeFrame::Hour1));

        drop(guard);
        let progress = handle.snapshot();
        assert!(!progress.running);
        assert_eq!(progress.current, 6);
        assert!(progress.symbol.is_none());
        assert!(progress.timeframe.is_none());
    }

    #[test]
    fn second_sweep_is_refused_while_first_runs() {
        let handle = ProgressHandle::default();
        let guard = handle.begin(false, 2).unwrap();
        assert!(handle.clone().begin(false, 2).is_none());
        drop(guard);
        assert!(handle.begin(false, 2).is_some());
    }

    #[test]
    fn serializes_camel_case() {
        let json = serde_json::to_value(ScanProgress::default()).unwrap();
        assert_eq!(json["indicatorOnly"], false);
        assert!(json["symbol"].is_null());
    }
}

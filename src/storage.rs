pub mod sqlite;

use chrono::{DateTime, Utc};
use error_stack::Report;
use futures::future::BoxFuture;

use crate::error::StorageError;
use crate::model::Candidate;

pub trait CandidateStore: Send + Sync {
    /// Delete every persisted candidate, returning how many were removed.
    fn clear_candidates(&self) -> BoxFuture<'_, Result<u64, Report<StorageError>>>;

    fn insert_candidate(
        &self,
        candidate: &Candidate,
    ) -> BoxFuture<'_, Result<(), Report<StorageError>>>;

    /// Newest sweep first; within a sweep, insertion order.
    fn list_candidates(
        &self,
        limit: usize,
    ) -> BoxFuture<'_, Result<Vec<Candidate>, Report<StorageError>>>;

    fn record_last_scanned_at(
        &self,
        at: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<(), Report<StorageError>>>;

    fn last_scanned_at(
        &self,
    ) -> BoxFuture<'_, Result<Option<DateTime<Utc>>, Report<StorageError>>>;
}

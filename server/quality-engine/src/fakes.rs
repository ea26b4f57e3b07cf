//! Collaborator fakes for tests and local runs.
//!
//! Reviewers with fixed behaviour, and a history store that conflicts on
//! demand around a `MemoryHistoryStore`. For an outage use
//! `history::UnavailableHistoryStore`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{HistoryError, HistoryResult, ReviewError};
use crate::history::{AppendOutcome, HistoryStore, MemoryHistoryStore};
use crate::review::{Review, Reviewer};
use crate::types::{AnalysisRecord, AnalysisResult, ChangeSet, Snapshot};

// ---------------------------------------------------------------------------
// Reviewers
// ---------------------------------------------------------------------------

/// Always returns the same review and counts calls.
#[derive(Debug, Default)]
pub struct StaticReviewer {
  review: Review,
  calls: AtomicUsize,
}

impl StaticReviewer {
  pub fn new(opinion: &str, suggestions: &[&str]) -> Self {
    Self {
      review: Review {
        opinion: opinion.to_string(),
        suggestions: suggestions.iter().map(|s| s.to_string()).collect(),
      },
      calls: AtomicUsize::new(0),
    }
  }

  pub fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }
}

#[async_trait]
impl Reviewer for StaticReviewer {
  async fn review(&self, _changeset: &ChangeSet, _timeout: Duration) -> Result<Review, ReviewError> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    Ok(self.review.clone())
  }
}

/// Always fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct FailingReviewer;

#[async_trait]
impl Reviewer for FailingReviewer {
  async fn review(&self, _changeset: &ChangeSet, _timeout: Duration) -> Result<Review, ReviewError> {
    Err(ReviewError::Unavailable("review service returned 503".into()))
  }
}

/// Sleeps before answering; ignores the timeout it is given.
#[derive(Debug, Clone, Copy)]
pub struct SlowReviewer {
  pub delay: Duration,
}

#[async_trait]
impl Reviewer for SlowReviewer {
  async fn review(&self, _changeset: &ChangeSet, _timeout: Duration) -> Result<Review, ReviewError> {
    tokio::time::sleep(self.delay).await;
    Ok(Review {
      opinion: "late opinion".into(),
      suggestions: vec![],
    })
  }
}

// ---------------------------------------------------------------------------
// History stores
// ---------------------------------------------------------------------------

/// Wraps a memory store and rejects the first `conflicts` appends with
/// `Conflict`, as if another writer had moved the head.
#[derive(Debug, Default)]
pub struct ContendedHistoryStore {
  inner: MemoryHistoryStore,
  remaining: AtomicUsize,
  appends: AtomicUsize,
}

impl ContendedHistoryStore {
  pub fn new(conflicts: usize) -> Self {
    Self {
      inner: MemoryHistoryStore::new(),
      remaining: AtomicUsize::new(conflicts),
      appends: AtomicUsize::new(0),
    }
  }

  /// Append attempts seen, conflicting ones included.
  pub fn append_attempts(&self) -> usize {
    self.appends.load(Ordering::SeqCst)
  }
}

#[async_trait]
impl HistoryStore for ContendedHistoryStore {
  async fn recent(&self, repository: &str, branch: &str, limit: usize) -> HistoryResult<Vec<Snapshot>> {
    self.inner.recent(repository, branch, limit).await
  }

  async fn find(
    &self,
    repository: &str,
    branch: &str,
    commit_sha: &str,
  ) -> HistoryResult<Option<AnalysisResult>> {
    self.inner.find(repository, branch, commit_sha).await
  }

  async fn append(
    &self,
    record: AnalysisRecord,
    expected_head: Option<&str>,
  ) -> HistoryResult<AppendOutcome> {
    self.appends.fetch_add(1, Ordering::SeqCst);
    let conflicted = self
      .remaining
      .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
      .is_ok();
    if conflicted {
      return Err(HistoryError::Conflict {
        repository: record.snapshot.repository.clone(),
        branch: record.snapshot.branch.clone(),
      });
    }
    self.inner.append(record, expected_head).await
  }

  async fn all_results(&self) -> HistoryResult<Vec<AnalysisResult>> {
    self.inner.all_results().await
  }
}

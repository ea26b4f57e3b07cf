//! Snapshot history: the only shared mutable state in the pipeline.
//!
//! Records are partitioned by `(repository, branch)` and ordered by snapshot
//! timestamp within a partition, append order breaking ties. `append` is a
//! compare-and-set on the partition head (the newest snapshot in that order)
//! so two concurrent pushes on one branch can never both append against the
//! same stale baseline; the loser gets `Conflict` and retries.
//!
//! - `MemoryHistoryStore`: process-local, `std::sync::Mutex` guarded.
//! - `FileHistoryStore`: JSON-lines log, one `AnalysisRecord` per line.
//! - `UnavailableHistoryStore`: stands in when the log cannot be opened.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::error::{HistoryError, HistoryResult};
use crate::types::{AnalysisRecord, AnalysisResult, Snapshot};

#[derive(Debug, Clone, PartialEq)]
pub enum AppendOutcome {
  Appended,
  /// The commit was already recorded; carries the stored result.
  Duplicate(Box<AnalysisResult>),
}

#[async_trait]
pub trait HistoryStore: Send + Sync {
  /// Up to `limit` snapshots for the partition, newest timestamp first.
  async fn recent(&self, repository: &str, branch: &str, limit: usize)
    -> HistoryResult<Vec<Snapshot>>;

  /// Stored result for an already analyzed commit.
  async fn find(
    &self,
    repository: &str,
    branch: &str,
    commit_sha: &str,
  ) -> HistoryResult<Option<AnalysisResult>>;

  /// Append atomically if the partition's newest commit is still
  /// `expected_head` (None = partition empty).
  async fn append(
    &self,
    record: AnalysisRecord,
    expected_head: Option<&str>,
  ) -> HistoryResult<AppendOutcome>;

  /// Every stored result, in append order.
  async fn all_results(&self) -> HistoryResult<Vec<AnalysisResult>>;
}

// ---------------------------------------------------------------------------
// Shared partition bookkeeping
// ---------------------------------------------------------------------------

type PartitionKey = (String, String);

#[derive(Debug)]
struct Entry {
  /// Global append sequence.
  seq: usize,
  record: AnalysisRecord,
}

#[derive(Debug, Default)]
struct Ledger {
  /// Each partition sorted by snapshot timestamp, then by `seq`.
  partitions: HashMap<PartitionKey, Vec<Entry>>,
  appended: usize,
}

enum Check {
  Ready,
  Duplicate(Box<AnalysisResult>),
  Conflict,
}

impl Ledger {
  fn key(repository: &str, branch: &str) -> PartitionKey {
    (repository.to_string(), branch.to_string())
  }

  fn recent(&self, repository: &str, branch: &str, limit: usize) -> Vec<Snapshot> {
    self
      .partitions
      .get(&Self::key(repository, branch))
      .map(|entries| {
        entries
          .iter()
          .rev()
          .take(limit)
          .map(|e| e.record.snapshot.clone())
          .collect()
      })
      .unwrap_or_default()
  }

  fn find(&self, repository: &str, branch: &str, commit_sha: &str) -> Option<AnalysisResult> {
    self
      .partitions
      .get(&Self::key(repository, branch))?
      .iter()
      .find(|e| e.record.snapshot.commit_sha == commit_sha)
      .map(|e| e.record.result.clone())
  }

  fn check(&self, record: &AnalysisRecord, expected_head: Option<&str>) -> Check {
    let s = &record.snapshot;
    let entries = self.partitions.get(&Self::key(&s.repository, &s.branch));
    if let Some(existing) = entries
      .and_then(|es| es.iter().find(|e| e.record.snapshot.commit_sha == s.commit_sha))
    {
      return Check::Duplicate(Box::new(existing.record.result.clone()));
    }
    // Same order as `recent`, so the head is what a reader saw first.
    let head = entries
      .and_then(|es| es.last())
      .map(|e| e.record.snapshot.commit_sha.as_str());
    if head != expected_head {
      return Check::Conflict;
    }
    Check::Ready
  }

  fn insert(&mut self, record: AnalysisRecord) {
    let key = Self::key(&record.snapshot.repository, &record.snapshot.branch);
    let entries = self.partitions.entry(key).or_default();
    let at = entries.partition_point(|e| e.record.snapshot.timestamp <= record.snapshot.timestamp);
    entries.insert(
      at,
      Entry {
        seq: self.appended,
        record,
      },
    );
    self.appended += 1;
  }

  fn all_results(&self) -> Vec<AnalysisResult> {
    let mut entries: Vec<&Entry> = self.partitions.values().flatten().collect();
    entries.sort_by_key(|e| e.seq);
    entries.into_iter().map(|e| e.record.result.clone()).collect()
  }
}

fn conflict(record: &AnalysisRecord) -> HistoryError {
  HistoryError::Conflict {
    repository: record.snapshot.repository.clone(),
    branch: record.snapshot.branch.clone(),
  }
}

// ---------------------------------------------------------------------------
// MemoryHistoryStore
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryHistoryStore {
  ledger: Mutex<Ledger>,
}

impl MemoryHistoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(&self) -> HistoryResult<std::sync::MutexGuard<'_, Ledger>> {
    self
      .ledger
      .lock()
      .map_err(|_| HistoryError::Unavailable("history lock poisoned".into()))
  }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
  async fn recent(
    &self,
    repository: &str,
    branch: &str,
    limit: usize,
  ) -> HistoryResult<Vec<Snapshot>> {
    Ok(self.lock()?.recent(repository, branch, limit))
  }

  async fn find(
    &self,
    repository: &str,
    branch: &str,
    commit_sha: &str,
  ) -> HistoryResult<Option<AnalysisResult>> {
    Ok(self.lock()?.find(repository, branch, commit_sha))
  }

  async fn append(
    &self,
    record: AnalysisRecord,
    expected_head: Option<&str>,
  ) -> HistoryResult<AppendOutcome> {
    let mut ledger = self.lock()?;
    match ledger.check(&record, expected_head) {
      Check::Duplicate(existing) => Ok(AppendOutcome::Duplicate(existing)),
      Check::Conflict => Err(conflict(&record)),
      Check::Ready => {
        ledger.insert(record);
        Ok(AppendOutcome::Appended)
      }
    }
  }

  async fn all_results(&self) -> HistoryResult<Vec<AnalysisResult>> {
    Ok(self.lock()?.all_results())
  }
}

// ---------------------------------------------------------------------------
// FileHistoryStore
// ---------------------------------------------------------------------------

/// Append-only JSON-lines log. The whole log is indexed in memory at open;
/// a record is visible to readers only after its line is flushed.
#[derive(Debug)]
pub struct FileHistoryStore {
  path: PathBuf,
  ledger: tokio::sync::Mutex<Ledger>,
}

/// What `replay` recovered from the raw log.
struct Replay {
  ledger: Ledger,
  /// Byte length of the log up to the end of the last readable line.
  keep: usize,
}

/// Index every readable line. An unreadable last line is a torn append and
/// is left out of `keep`; unreadable lines before it are skipped in place.
fn replay(bytes: &[u8], path: &Path) -> Replay {
  let mut ledger = Ledger::default();
  let mut keep = 0;
  let mut offset = 0;
  for (n, line) in bytes.split_inclusive(|b| *b == b'\n').enumerate() {
    offset += line.len();
    if line.iter().all(u8::is_ascii_whitespace) {
      keep = offset;
      continue;
    }
    match serde_json::from_slice::<AnalysisRecord>(line) {
      Ok(record) => {
        ledger.insert(record);
        keep = offset;
      }
      Err(e) if offset == bytes.len() => {
        warn!(
          path = %path.display(),
          line = n + 1,
          error = %e,
          "dropping torn record at end of history log"
        );
      }
      Err(e) => {
        warn!(
          path = %path.display(),
          line = n + 1,
          error = %e,
          "skipping unreadable history record"
        );
        keep = offset;
      }
    }
  }
  Replay { ledger, keep }
}

impl FileHistoryStore {
  /// Open (or create on first append) the log at `path`.
  ///
  /// A torn trailing line is cut off so the next append starts on a
  /// fresh line.
  pub async fn open(path: impl AsRef<Path>) -> HistoryResult<Self> {
    let path = path.as_ref().to_path_buf();
    let bytes = match tokio::fs::read(&path).await {
      Ok(bytes) => bytes,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
      Err(e) => return Err(e.into()),
    };

    let Replay { ledger, keep } = replay(&bytes, &path);
    let unterminated = keep > 0 && bytes[keep - 1] != b'\n';
    if keep < bytes.len() || unterminated {
      let mut file = tokio::fs::OpenOptions::new()
        .append(true)
        .open(&path)
        .await?;
      file.set_len(keep as u64).await?;
      if unterminated {
        file.write_all(b"\n").await?;
      }
      file.flush().await?;
      debug!(
        path = %path.display(),
        kept = keep,
        dropped = bytes.len() - keep,
        "history log repaired"
      );
    }

    Ok(Self {
      path,
      ledger: tokio::sync::Mutex::new(ledger),
    })
  }

  pub fn path(&self) -> &Path {
    &self.path
  }
}

#[async_trait]
impl HistoryStore for FileHistoryStore {
  async fn recent(
    &self,
    repository: &str,
    branch: &str,
    limit: usize,
  ) -> HistoryResult<Vec<Snapshot>> {
    Ok(self.ledger.lock().await.recent(repository, branch, limit))
  }

  async fn find(
    &self,
    repository: &str,
    branch: &str,
    commit_sha: &str,
  ) -> HistoryResult<Option<AnalysisResult>> {
    Ok(self.ledger.lock().await.find(repository, branch, commit_sha))
  }

  async fn append(
    &self,
    record: AnalysisRecord,
    expected_head: Option<&str>,
  ) -> HistoryResult<AppendOutcome> {
    let mut ledger = self.ledger.lock().await;
    match ledger.check(&record, expected_head) {
      Check::Duplicate(existing) => return Ok(AppendOutcome::Duplicate(existing)),
      Check::Conflict => return Err(conflict(&record)),
      Check::Ready => {}
    }

    let mut line = serde_json::to_string(&record)?;
    line.push('\n');
    let mut file = tokio::fs::OpenOptions::new()
      .create(true)
      .append(true)
      .open(&self.path)
      .await?;
    let len = file.metadata().await?.len();
    if let Err(e) = file.write_all(line.as_bytes()).await {
      // Never leave a partial line for the next append to run into.
      file.set_len(len).await.ok();
      return Err(e.into());
    }
    file.flush().await?;

    ledger.insert(record);
    Ok(AppendOutcome::Appended)
  }

  async fn all_results(&self) -> HistoryResult<Vec<AnalysisResult>> {
    Ok(self.ledger.lock().await.all_results())
  }
}

/// Open the log at `path`, or fall back to a store that reports every call
/// as unavailable so analysis still runs without history.
pub async fn open_or_unavailable(path: &Path) -> Arc<dyn HistoryStore> {
  match FileHistoryStore::open(path).await {
    Ok(store) => {
      debug!(path = %store.path().display(), "history log opened");
      Arc::new(store)
    }
    Err(e) => {
      warn!(path = %path.display(), error = %e, "history log unusable; continuing without history");
      Arc::new(UnavailableHistoryStore::new(format!(
        "history log {}: {}",
        path.display(),
        e
      )))
    }
  }
}

// ---------------------------------------------------------------------------
// UnavailableHistoryStore
// ---------------------------------------------------------------------------

/// Every operation fails with `Unavailable`.
#[derive(Debug, Clone)]
pub struct UnavailableHistoryStore {
  reason: String,
}

impl UnavailableHistoryStore {
  pub fn new(reason: impl Into<String>) -> Self {
    Self {
      reason: reason.into(),
    }
  }

  fn down(&self) -> HistoryError {
    HistoryError::Unavailable(self.reason.clone())
  }
}

#[async_trait]
impl HistoryStore for UnavailableHistoryStore {
  async fn recent(&self, _repository: &str, _branch: &str, _limit: usize) -> HistoryResult<Vec<Snapshot>> {
    Err(self.down())
  }

  async fn find(&self, _repository: &str, _branch: &str, _sha: &str) -> HistoryResult<Option<AnalysisResult>> {
    Err(self.down())
  }

  async fn append(&self, _record: AnalysisRecord, _head: Option<&str>) -> HistoryResult<AppendOutcome> {
    Err(self.down())
  }

  async fn all_results(&self) -> HistoryResult<Vec<AnalysisResult>> {
    Err(self.down())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::types::*;
  use chrono::{DateTime, TimeZone, Utc};

  fn at(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 15, hour, 0, 0).unwrap()
  }

  fn record_at(
    repo: &str,
    branch: &str,
    sha: &str,
    score: u8,
    timestamp: DateTime<Utc>,
  ) -> AnalysisRecord {
    AnalysisRecord {
      snapshot: Snapshot {
        repository: repo.into(),
        branch: branch.into(),
        commit_sha: sha.into(),
        timestamp,
        score,
        loc_delta: 0,
        avg_complexity: Some(1.0),
      },
      result: AnalysisResult {
        repository: repo.into(),
        branch: branch.into(),
        commit_sha: sha.into(),
        author: "dev".into(),
        commit_message: String::new(),
        timestamp: Some(timestamp),
        score,
        grade: Grade::A,
        gate_passed: true,
        integrity_status: IntegrityStatus::Pass,
        content_hash: String::new(),
        files_scanned: 0,
        metrics: ChangeSetMetrics::default(),
        breakdown: ScoreBreakdown::default(),
        findings: vec![],
        trend: TrendDelta {
          direction: TrendDirection::Flat,
          magnitude: 0.0,
          compared_against: None,
          baseline: None,
          samples: 0,
          summary: String::new(),
          loc_change: None,
          complexity_change: None,
          points: vec![],
        },
        opinion_text: None,
        suggestions: vec![],
      },
    }
  }

  fn record(repo: &str, branch: &str, sha: &str, score: u8) -> AnalysisRecord {
    record_at(repo, branch, sha, score, at(10))
  }

  fn line(record: &AnalysisRecord) -> String {
    format!("{}\n", serde_json::to_string(record).unwrap())
  }

  async fn exercise(store: &dyn HistoryStore) {
    assert!(store.recent("r", "main", 10).await.unwrap().is_empty());

    let out = store.append(record("r", "main", "c1", 70), None).await.unwrap();
    assert_eq!(out, AppendOutcome::Appended);
    store.append(record("r", "main", "c2", 80), Some("c1")).await.unwrap();
    store.append(record("r", "dev", "d1", 50), None).await.unwrap();

    let recent = store.recent("r", "main", 10).await.unwrap();
    let shas: Vec<_> = recent.iter().map(|s| s.commit_sha.as_str()).collect();
    assert_eq!(shas, vec!["c2", "c1"]);
    assert_eq!(store.recent("r", "main", 1).await.unwrap().len(), 1);

    // Stale head loses.
    let err = store.append(record("r", "main", "c3", 90), Some("c1")).await.unwrap_err();
    assert!(matches!(err, HistoryError::Conflict { .. }));

    // Re-submitting a known commit is reported, never duplicated.
    let dup = store.append(record("r", "main", "c1", 10), Some("c2")).await.unwrap();
    match dup {
      AppendOutcome::Duplicate(existing) => assert_eq!(existing.score, 70),
      other => panic!("expected duplicate, got {:?}", other),
    }

    assert_eq!(store.find("r", "main", "c2").await.unwrap().unwrap().score, 80);
    assert!(store.find("r", "dev", "c2").await.unwrap().is_none());

    let all: Vec<_> = store
      .all_results()
      .await
      .unwrap()
      .into_iter()
      .map(|r| r.commit_sha)
      .collect();
    assert_eq!(all, vec!["c1", "c2", "d1"]);
  }

  #[tokio::test]
  async fn memory_store_contract() {
    exercise(&MemoryHistoryStore::new()).await;
  }

  #[tokio::test]
  async fn file_store_contract() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileHistoryStore::open(dir.path().join("history.jsonl")).await.unwrap();
    exercise(&store).await;
  }

  #[tokio::test]
  async fn late_push_is_ordered_by_timestamp() {
    let store = MemoryHistoryStore::new();
    store.append(record_at("r", "main", "c1", 70, at(9)), None).await.unwrap();
    store.append(record_at("r", "main", "c3", 90, at(11)), Some("c1")).await.unwrap();
    // CI re-sends an older push after a newer one landed; the head is still c3.
    store.append(record_at("r", "main", "c2", 80, at(10)), Some("c3")).await.unwrap();

    let recent = store.recent("r", "main", 10).await.unwrap();
    let shas: Vec<_> = recent.iter().map(|s| s.commit_sha.as_str()).collect();
    assert_eq!(shas, vec!["c3", "c2", "c1"]);

    // The head follows timestamp order, not append order.
    let err = store
      .append(record_at("r", "main", "c4", 60, at(12)), Some("c2"))
      .await
      .unwrap_err();
    assert!(matches!(err, HistoryError::Conflict { .. }));
    store.append(record_at("r", "main", "c4", 60, at(12)), Some("c3")).await.unwrap();

    let all: Vec<_> = store
      .all_results()
      .await
      .unwrap()
      .into_iter()
      .map(|r| r.commit_sha)
      .collect();
    assert_eq!(all, vec!["c1", "c3", "c2", "c4"]);
  }

  #[tokio::test]
  async fn equal_timestamps_keep_append_order() {
    let store = MemoryHistoryStore::new();
    store.append(record("r", "main", "c1", 70), None).await.unwrap();
    store.append(record("r", "main", "c2", 70), Some("c1")).await.unwrap();
    store.append(record("r", "main", "c3", 70), Some("c2")).await.unwrap();
    let recent = store.recent("r", "main", 10).await.unwrap();
    let shas: Vec<_> = recent.iter().map(|s| s.commit_sha.as_str()).collect();
    assert_eq!(shas, vec!["c3", "c2", "c1"]);
  }

  #[tokio::test]
  async fn file_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("history.jsonl");
    {
      let store = FileHistoryStore::open(&path).await.unwrap();
      store.append(record("r", "main", "c1", 70), None).await.unwrap();
      store.append(record("r", "main", "c2", 75), Some("c1")).await.unwrap();
    }
    let store = FileHistoryStore::open(&path).await.unwrap();
    let recent = store.recent("r", "main", 5).await.unwrap();
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].commit_sha, "c2");
    let text = std::fs::read_to_string(&path).unwrap();
    assert_eq!(text.lines().count(), 2);
  }

  #[tokio::test]
  async fn torn_trailing_line_is_dropped_on_open() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("history.jsonl");
    let good = line(&record("acme/api", "main", "c1", 70));
    std::fs::write(&path, format!("{}{}", good, r#"{"snapshot":{"repository":"acme/api""#)).unwrap();

    let store = FileHistoryStore::open(&path).await.unwrap();
    assert_eq!(store.all_results().await.unwrap().len(), 1);
    assert_eq!(std::fs::read_to_string(&path).unwrap(), good);
  }

  #[tokio::test]
  async fn append_after_torn_line_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("history.jsonl");
    let good = line(&record("acme/api", "main", "c1", 70));
    std::fs::write(&path, format!("{}{}", good, r#"{"snapshot":{"repo"#)).unwrap();

    {
      let store = FileHistoryStore::open(&path).await.unwrap();
      store
        .append(record("acme/api", "main", "c2", 80), Some("c1"))
        .await
        .unwrap();
    }

    let store = FileHistoryStore::open(&path).await.unwrap();
    let shas: Vec<_> = store
      .recent("acme/api", "main", 10)
      .await
      .unwrap()
      .into_iter()
      .map(|s| s.commit_sha)
      .collect();
    assert_eq!(shas, vec!["c2", "c1"]);
    assert_eq!(std::fs::read_to_string(&path).unwrap().lines().count(), 2);
  }

  #[tokio::test]
  async fn unterminated_last_record_gets_its_newline() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("history.jsonl");
    let good = line(&record("r", "main", "c1", 70));
    std::fs::write(&path, good.trim_end()).unwrap();

    let store = FileHistoryStore::open(&path).await.unwrap();
    store.append(record("r", "main", "c2", 75), Some("c1")).await.unwrap();
    drop(store);

    let store = FileHistoryStore::open(&path).await.unwrap();
    assert_eq!(store.all_results().await.unwrap().len(), 2);
  }

  #[tokio::test]
  async fn unreadable_middle_line_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("history.jsonl");
    let first = line(&record("r", "main", "c1", 70));
    let last = line(&record("r", "main", "c2", 75));
    std::fs::write(&path, format!("{}{{not json}}\n{}", first, last)).unwrap();

    let store = FileHistoryStore::open(&path).await.unwrap();
    assert_eq!(store.all_results().await.unwrap().len(), 2);
    // Complete lines are left alone.
    assert_eq!(std::fs::read_to_string(&path).unwrap().lines().count(), 3);
  }

  #[tokio::test]
  async fn records_without_complexity_still_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("history.jsonl");
    let mut value = serde_json::to_value(record("r", "main", "c1", 70)).unwrap();
    value["snapshot"].as_object_mut().unwrap().remove("avg_complexity");
    value["result"]["trend"].as_object_mut().unwrap().remove("loc_change");
    std::fs::write(&path, format!("{}\n", value)).unwrap();

    let store = FileHistoryStore::open(&path).await.unwrap();
    let recent = store.recent("r", "main", 1).await.unwrap();
    assert_eq!(recent[0].avg_complexity, None);
  }

  #[tokio::test]
  async fn unopenable_log_falls_back_to_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    // A directory cannot be read as a log.
    let store = open_or_unavailable(dir.path()).await;
    let err = store.recent("r", "main", 5).await.unwrap_err();
    assert!(matches!(err, HistoryError::Unavailable(_)));
    assert!(matches!(
      store.append(record("r", "main", "c1", 70), None).await,
      Err(HistoryError::Unavailable(_))
    ));

    let ok = open_or_unavailable(&dir.path().join("history.jsonl")).await;
    assert!(ok.recent("r", "main", 5).await.unwrap().is_empty());
  }
}

//! Core engine: runs one push through the analysis pipeline.
//!
//! ingest → dedupe → diff parse → analyzer / integrity / deprecation → score
//! → (review ∥ history read) → trend → append.
//!
//! Stages up to the score are pure. Only the history store is shared
//! mutable state, and it serializes appends per `(repository, branch)`.

use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use tracing::{debug, error, info, instrument, warn};

use crate::analyzer::{self, IgnoreSet};
use crate::config::Config;
use crate::deprecation::{self, DenyList};
use crate::developer::{self, DeveloperStats};
use crate::diff;
use crate::error::{ConfigError, EngineError, HistoryError, HistoryResult, ReviewError};
use crate::history::{AppendOutcome, HistoryStore, MemoryHistoryStore};
use crate::ingest;
use crate::integrity::{self, IntegrityRules};
use crate::report::{self, Report};
use crate::review::{DisabledReviewer, Review, Reviewer};
use crate::score::{self, ScoreOutcome};
use crate::trend;
use crate::types::*;

/// Everything computed before the trend; never recomputed on append retry.
struct Assessment {
  metrics: ChangeSetMetrics,
  integrity_status: IntegrityStatus,
  content_hash: String,
  files_scanned: usize,
  findings: Vec<Finding>,
  score: ScoreOutcome,
}

/// The push quality engine. Compiled rules plus the two collaborators.
pub struct Engine {
  config: Config,
  ignore: IgnoreSet,
  integrity: IntegrityRules,
  deny: DenyList,
  history: Arc<dyn HistoryStore>,
  reviewer: Arc<dyn Reviewer>,
}

impl Engine {
  pub fn new(
    config: Config,
    history: Arc<dyn HistoryStore>,
    reviewer: Arc<dyn Reviewer>,
  ) -> Result<Self, ConfigError> {
    config.validate()?;
    let ignore = IgnoreSet::new(&config.analyzer.ignore_globs)?;
    let integrity = IntegrityRules::new(&config.integrity)?;
    let deny = DenyList::new(&config.deprecation)?;
    debug!(
      ignore_globs = config.analyzer.ignore_globs.len(),
      deny_rules = deny.len(),
      "engine rules compiled"
    );
    Ok(Self {
      config,
      ignore,
      integrity,
      deny,
      history,
      reviewer,
    })
  }

  /// Default config, in-memory history, review disabled.
  pub fn with_defaults() -> Result<Self, ConfigError> {
    Self::new(
      Config::default(),
      Arc::new(MemoryHistoryStore::new()),
      Arc::new(DisabledReviewer),
    )
  }

  pub fn config(&self) -> &Config {
    &self.config
  }

  pub fn history(&self) -> &Arc<dyn HistoryStore> {
    &self.history
  }

  /// Analyze a raw JSON payload.
  pub async fn analyze(&self, raw: &serde_json::Value) -> Result<AnalysisResult, EngineError> {
    let push = InboundPush::deserialize(raw)
      .map_err(|e| EngineError::invalid("payload", &e.to_string()))?;
    self.analyze_push(&push).await
  }

  /// Analyze a JSON payload given as text.
  pub async fn analyze_str(&self, raw: &str) -> Result<AnalysisResult, EngineError> {
    let push: InboundPush = serde_json::from_str(raw)
      .map_err(|e| EngineError::invalid("payload", &format!("json parse: {}", e)))?;
    self.analyze_push(&push).await
  }

  /// Run the pipeline. Only `InvalidPayload` is ever returned as an error;
  /// history and review failures degrade the result instead.
  #[instrument(skip_all, fields(repository = %raw.repository, commit = %raw.commit_sha))]
  pub async fn analyze_push(&self, raw: &InboundPush) -> Result<AnalysisResult, EngineError> {
    let changeset = ingest::ingest(raw, &self.config.ingest)?;

    match self
      .history
      .find(&changeset.repository, &changeset.branch, &changeset.commit_sha)
      .await
    {
      Ok(Some(existing)) => {
        info!("commit already analyzed; returning stored result");
        return Ok(existing);
      }
      Ok(None) => {}
      Err(e) => warn!(error = %e, "history lookup failed; analyzing anyway"),
    }

    let assessment = self.assess(&changeset);
    debug!(
      score = assessment.score.score,
      findings = assessment.findings.len(),
      integrity = assessment.integrity_status.as_str(),
      "assessment complete"
    );

    // The review never holds a history lock and is bounded by its timeout.
    let (review, history_read) = tokio::join!(self.review(&changeset), self.read_history(&changeset));

    let result = self.settle(&changeset, assessment, review, history_read).await;
    info!(
      score = result.score,
      grade = result.grade.as_str(),
      trend = result.trend.direction.as_str(),
      "analysis complete"
    );
    Ok(result)
  }

  /// Render the Markdown report of a result.
  pub fn render(&self, result: &AnalysisResult) -> Report {
    report::render(result)
  }

  /// Per-developer stats over everything in history.
  pub async fn developer_stats(&self) -> Result<Vec<DeveloperStats>, HistoryError> {
    Ok(developer::developer_stats(&self.history.all_results().await?))
  }

  /// Stats for one author, None when they have no recorded push.
  pub async fn developer(&self, author: &str) -> Result<Option<DeveloperStats>, HistoryError> {
    Ok(developer::developer(&self.history.all_results().await?, author))
  }

  pub async fn leaderboard(&self) -> Result<Vec<DeveloperStats>, HistoryError> {
    Ok(developer::leaderboard(&self.history.all_results().await?))
  }

  fn assess(&self, changeset: &ChangeSet) -> Assessment {
    let parsed = diff::parse_files(changeset, &self.ignore);
    let stats = analyzer::analyze(&parsed, &self.config.analyzer);
    debug!(
      files = stats.files.len(),
      ignored = stats.files.iter().filter(|f| f.ignored).count(),
      malformed = stats.files.iter().filter(|f| f.malformed).count(),
      "static analysis complete"
    );
    let integrity = integrity::validate(&parsed, &self.integrity);
    let deprecated = deprecation::detect(&parsed, &self.deny);

    let mut findings = integrity.findings;
    findings.extend(deprecated);
    findings.extend(stats.findings);
    // Stable: ties keep stage order.
    findings.sort_by(|a, b| {
      a.category
        .cmp(&b.category)
        .then_with(|| a.file.cmp(&b.file))
        .then_with(|| a.line.cmp(&b.line))
    });

    let score = score::compute(
      &findings,
      stats.metrics.avg_complexity,
      integrity.status,
      &self.config.score,
    );

    Assessment {
      metrics: stats.metrics,
      integrity_status: integrity.status,
      content_hash: integrity.content_hash,
      files_scanned: integrity.files_scanned,
      findings,
      score,
    }
  }

  async fn review(&self, changeset: &ChangeSet) -> Option<Review> {
    let timeout = self.config.review.timeout();
    let outcome = match tokio::time::timeout(timeout, self.reviewer.review(changeset, timeout)).await
    {
      Ok(r) => r,
      Err(_) => Err(ReviewError::Timeout(timeout)),
    };
    match outcome {
      Ok(review) if !review.opinion.trim().is_empty() => Some(review),
      Ok(_) => {
        debug!("reviewer returned an empty opinion");
        None
      }
      Err(e) => {
        warn!(error = %e, "review unavailable; continuing without opinion");
        None
      }
    }
  }

  async fn read_history(&self, changeset: &ChangeSet) -> HistoryResult<Vec<Snapshot>> {
    // One extra so a same-sha snapshot cannot shrink the window.
    self
      .history
      .recent(
        &changeset.repository,
        &changeset.branch,
        self.config.trend.lookback + 1,
      )
      .await
  }

  /// Trend, then append; on a head conflict re-read and try again.
  async fn settle(
    &self,
    changeset: &ChangeSet,
    assessment: Assessment,
    review: Option<Review>,
    mut history_read: HistoryResult<Vec<Snapshot>>,
  ) -> AnalysisResult {
    let now = changeset.timestamp.unwrap_or_else(Utc::now);
    let max_retries = self.config.history.max_append_retries;
    let mut attempt = 0u32;
    let current = Snapshot {
      repository: changeset.repository.clone(),
      branch: changeset.branch.clone(),
      commit_sha: changeset.commit_sha.clone(),
      timestamp: now,
      score: assessment.score.score,
      loc_delta: assessment.metrics.loc_delta,
      avg_complexity: Some(assessment.metrics.avg_complexity),
    };

    loop {
      let snapshots = match history_read {
        Ok(s) => s,
        Err(e) => {
          warn!(error = %e, "history unavailable; trend not computed, result not persisted");
          let trend = trend::neutral(&current, "history unavailable; trend not computed");
          return build_result(changeset, &assessment, trend, review);
        }
      };

      let trend = trend::compute(&current, &snapshots, &self.config.trend);
      let head = snapshots.first().map(|s| s.commit_sha.clone());
      let result = build_result(changeset, &assessment, trend, review.clone());
      let record = AnalysisRecord {
        snapshot: current.clone(),
        result: result.clone(),
      };

      match self.history.append(record, head.as_deref()).await {
        Ok(AppendOutcome::Appended) => {
          debug!(attempt, "result appended to history");
          return result;
        }
        Ok(AppendOutcome::Duplicate(existing)) => {
          info!("commit recorded concurrently; returning stored result");
          return *existing;
        }
        Err(HistoryError::Conflict { .. }) if attempt < max_retries => {
          attempt += 1;
          debug!(attempt, "partition head moved; recomputing trend");
          history_read = self.read_history(changeset).await;
        }
        Err(e) => {
          error!(error = %e, attempt, "failed to persist result");
          return result;
        }
      }
    }
  }
}

fn build_result(
  changeset: &ChangeSet,
  assessment: &Assessment,
  trend: TrendDelta,
  review: Option<Review>,
) -> AnalysisResult {
  let (opinion_text, suggestions) = match review {
    Some(r) => (Some(r.opinion), r.suggestions),
    None => (None, Vec::new()),
  };
  AnalysisResult {
    repository: changeset.repository.clone(),
    branch: changeset.branch.clone(),
    commit_sha: changeset.commit_sha.clone(),
    author: changeset.author.clone(),
    commit_message: changeset.commit_message.clone(),
    timestamp: changeset.timestamp,
    score: assessment.score.score,
    grade: assessment.score.grade,
    gate_passed: assessment.score.gate_passed,
    integrity_status: assessment.integrity_status,
    content_hash: assessment.content_hash.clone(),
    files_scanned: assessment.files_scanned,
    metrics: assessment.metrics.clone(),
    breakdown: assessment.score.breakdown.clone(),
    findings: assessment.findings.clone(),
    trend,
    opinion_text,
    suggestions,
  }
}

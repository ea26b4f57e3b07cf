//! Per-developer projections over stored results.
//!
//! Developers are not stored entities: every figure here is recomputed from
//! the result stream on demand.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::AnalysisResult;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeveloperStats {
  pub author: String,
  pub pushes: usize,
  pub lines_added: u64,
  pub lines_removed: u64,
  pub avg_score: f64,
  pub avg_complexity: f64,
  pub best_score: u8,
  pub worst_score: u8,
  pub first_push: Option<DateTime<Utc>>,
  pub last_push: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct Acc {
  pushes: usize,
  lines_added: u64,
  lines_removed: u64,
  score_sum: u64,
  complexity_sum: f64,
  best: u8,
  worst: u8,
  first: Option<DateTime<Utc>>,
  last: Option<DateTime<Utc>>,
}

/// Stats for every author, ordered by author.
pub fn developer_stats(results: &[AnalysisResult]) -> Vec<DeveloperStats> {
  let mut by_author: BTreeMap<&str, Acc> = BTreeMap::new();
  for r in results {
    let acc = by_author.entry(r.author.as_str()).or_insert_with(|| Acc {
      worst: u8::MAX,
      ..Acc::default()
    });
    acc.pushes += 1;
    acc.lines_added += r.metrics.lines_added;
    acc.lines_removed += r.metrics.lines_removed;
    acc.score_sum += r.score as u64;
    acc.complexity_sum += r.metrics.avg_complexity;
    acc.best = acc.best.max(r.score);
    acc.worst = acc.worst.min(r.score);
    if let Some(ts) = r.timestamp {
      acc.first = Some(acc.first.map_or(ts, |f| f.min(ts)));
      acc.last = Some(acc.last.map_or(ts, |l| l.max(ts)));
    }
  }

  by_author
    .into_iter()
    .map(|(author, acc)| DeveloperStats {
      author: author.to_string(),
      pushes: acc.pushes,
      lines_added: acc.lines_added,
      lines_removed: acc.lines_removed,
      avg_score: round2(acc.score_sum as f64 / acc.pushes as f64),
      avg_complexity: round2(acc.complexity_sum / acc.pushes as f64),
      best_score: acc.best,
      worst_score: acc.worst,
      first_push: acc.first,
      last_push: acc.last,
    })
    .collect()
}

/// Stats for one author, if they have pushed.
pub fn developer(results: &[AnalysisResult], author: &str) -> Option<DeveloperStats> {
  let own: Vec<AnalysisResult> = results
    .iter()
    .filter(|r| r.author == author)
    .cloned()
    .collect();
  developer_stats(&own).into_iter().next()
}

/// Average score descending, ties by author ascending.
pub fn leaderboard(results: &[AnalysisResult]) -> Vec<DeveloperStats> {
  let mut stats = developer_stats(results);
  stats.sort_by(|a, b| {
    b.avg_score
      .total_cmp(&a.avg_score)
      .then_with(|| a.author.cmp(&b.author))
  });
  stats
}

fn round2(x: f64) -> f64 {
  (x * 100.0).round() / 100.0
}

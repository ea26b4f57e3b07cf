//! Trend engine: current score against the mean of the branch's recent
//! snapshots.
//!
//! - No history → flat, `compared_against = None` (first analysis is never penalized).
//! - One prior point → that point is the baseline.
//! - Otherwise → mean score of the lookback window.
//!
//! The summary also notes net line growth over the window and the change
//! in average complexity since the most recent snapshot when either is large.

use chrono::{DateTime, Duration, Utc};

use crate::config::TrendConfig;
use crate::types::{Snapshot, TrendDelta, TrendDirection, TrendPoint};

/// Net line change beyond which the summary mentions codebase growth.
const LOC_NOTE_THRESHOLD: i64 = 50;
/// Complexity change beyond which the summary mentions it.
const COMPLEXITY_NOTE_THRESHOLD: f64 = 0.5;

/// Classify `magnitude = current - baseline` against the flat band.
/// An unchanged score is flat whatever the band.
pub fn classify(magnitude: f64, epsilon: f64) -> TrendDirection {
  if magnitude == 0.0 {
    TrendDirection::Flat
  } else if magnitude >= epsilon {
    TrendDirection::Improving
  } else if magnitude <= -epsilon {
    TrendDirection::Declining
  } else {
    TrendDirection::Flat
  }
}

/// Snapshots that form the baseline, most recent first.
///
/// `history` is most-recent-first as returned by the history store.
pub fn window<'a>(
  commit_sha: &str,
  now: DateTime<Utc>,
  history: &'a [Snapshot],
  config: &TrendConfig,
) -> Vec<&'a Snapshot> {
  let cutoff = config
    .lookback_days
    .and_then(Duration::try_days)
    .and_then(|d| now.checked_sub_signed(d));
  history
    .iter()
    .filter(|s| s.commit_sha != commit_sha)
    .filter(|s| cutoff.map_or(true, |c| s.timestamp >= c))
    .take(config.lookback)
    .collect()
}

/// Trend of the `current` snapshot against `history`.
pub fn compute(current: &Snapshot, history: &[Snapshot], config: &TrendConfig) -> TrendDelta {
  let window = window(&current.commit_sha, current.timestamp, history, config);
  let Some(previous) = window.first() else {
    return neutral(
      current,
      "first analysis for this branch; no baseline to compare against",
    );
  };

  let baseline = window.iter().map(|s| s.score as f64).sum::<f64>() / window.len() as f64;
  let magnitude = current.score as f64 - baseline;
  let direction = classify(magnitude, config.flat_epsilon);

  let loc_change = window.iter().map(|s| s.loc_delta).sum::<i64>() + current.loc_delta;
  let complexity_change = match (current.avg_complexity, previous.avg_complexity) {
    (Some(now), Some(before)) => Some(((now - before) * 100.0).round() / 100.0),
    _ => None,
  };

  let mut summary = match direction {
    TrendDirection::Improving => format!(
      "quality improved {:+.1} points ({:.1} → {})",
      magnitude, baseline, current.score
    ),
    TrendDirection::Declining => format!(
      "quality declined {:+.1} points ({:.1} → {})",
      magnitude, baseline, current.score
    ),
    TrendDirection::Flat => format!(
      "quality stable at {} (baseline {:.1})",
      current.score, baseline
    ),
  };
  if loc_change.abs() > LOC_NOTE_THRESHOLD {
    let verb = if loc_change > 0 { "grew" } else { "shrank" };
    summary.push_str(&format!("; codebase {} by {} lines", verb, loc_change.abs()));
  }
  if let Some(c) = complexity_change.filter(|c| c.abs() > COMPLEXITY_NOTE_THRESHOLD) {
    let verb = if c > 0.0 { "rose" } else { "fell" };
    summary.push_str(&format!("; complexity {} by {:.1}", verb, c.abs()));
  }

  let mut points: Vec<TrendPoint> = window
    .iter()
    .rev()
    .map(|s| TrendPoint {
      commit_sha: s.commit_sha.clone(),
      score: s.score,
    })
    .collect();
  points.push(TrendPoint {
    commit_sha: current.commit_sha.clone(),
    score: current.score,
  });

  TrendDelta {
    direction,
    magnitude,
    compared_against: Some(previous.commit_sha.clone()),
    baseline: Some(baseline),
    samples: window.len(),
    summary,
    loc_change: Some(loc_change),
    complexity_change,
    points,
  }
}

/// Flat trend with no comparison (first analysis, or history unreachable).
pub fn neutral(current: &Snapshot, summary: &str) -> TrendDelta {
  TrendDelta {
    direction: TrendDirection::Flat,
    magnitude: 0.0,
    compared_against: None,
    baseline: None,
    samples: 0,
    summary: summary.to_string(),
    loc_change: None,
    complexity_change: None,
    points: vec![TrendPoint {
      commit_sha: current.commit_sha.clone(),
      score: current.score,
    }],
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::TimeZone;
  use proptest::prelude::*;

  fn ts(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, day, 10, 0, 0).unwrap()
  }

  fn snap(sha: &str, day: u32, score: u8) -> Snapshot {
    Snapshot {
      repository: "acme/api".into(),
      branch: "main".into(),
      commit_sha: sha.into(),
      timestamp: ts(day),
      score,
      loc_delta: 0,
      avg_complexity: Some(2.0),
    }
  }

  /// The push being analyzed, on day 10.
  fn push(sha: &str, score: u8) -> Snapshot {
    snap(sha, 10, score)
  }

  #[test]
  fn empty_history_is_neutral() {
    let t = compute(&push("c1", 80), &[], &TrendConfig::default());
    assert_eq!(t.direction, TrendDirection::Flat);
    assert_eq!(t.compared_against, None);
    assert_eq!(t.magnitude, 0.0);
    assert_eq!(t.loc_change, None);
    assert_eq!(t.complexity_change, None);
    assert_eq!(t.points.len(), 1);
  }

  #[test]
  fn single_point_is_the_baseline() {
    let history = vec![snap("c0", 9, 70)];
    let t = compute(&push("c1", 80), &history, &TrendConfig::default());
    assert_eq!(t.direction, TrendDirection::Improving);
    assert_eq!(t.magnitude, 10.0);
    assert_eq!(t.baseline, Some(70.0));
    assert_eq!(t.compared_against.as_deref(), Some("c0"));
    assert_eq!(t.summary, "quality improved +10.0 points (70.0 → 80)");
  }

  #[test]
  fn mean_of_window_and_lookback_limit() {
    // Most recent first.
    let history = vec![snap("c3", 9, 90), snap("c2", 8, 80), snap("c1", 7, 10)];
    let config = TrendConfig {
      lookback: 2,
      ..TrendConfig::default()
    };
    let t = compute(&push("c4", 80), &history, &config);
    assert_eq!(t.baseline, Some(85.0));
    assert_eq!(t.samples, 2);
    assert_eq!(t.direction, TrendDirection::Declining);
    assert_eq!(t.compared_against.as_deref(), Some("c3"));
    let shas: Vec<_> = t.points.iter().map(|p| p.commit_sha.as_str()).collect();
    assert_eq!(shas, vec!["c2", "c3", "c4"]);
  }

  #[test]
  fn lookback_days_drops_old_snapshots() {
    let history = vec![snap("c2", 9, 50), snap("c1", 1, 0)];
    let config = TrendConfig {
      lookback_days: Some(3),
      ..TrendConfig::default()
    };
    let t = compute(&push("c3", 50), &history, &config);
    assert_eq!(t.samples, 1);
    assert_eq!(t.direction, TrendDirection::Flat);
  }

  #[test]
  fn same_commit_never_compared_with_itself() {
    let history = vec![snap("c1", 9, 40)];
    let t = compute(&push("c1", 90), &history, &TrendConfig::default());
    assert_eq!(t.compared_against, None);
  }

  #[test]
  fn within_epsilon_is_flat() {
    let history = vec![snap("c0", 9, 80)];
    let config = TrendConfig {
      flat_epsilon: 2.0,
      ..TrendConfig::default()
    };
    let t = compute(&push("c1", 81), &history, &config);
    assert_eq!(t.direction, TrendDirection::Flat);
    assert_eq!(t.magnitude, 1.0);
  }

  #[test]
  fn unchanged_score_is_flat_for_any_band() {
    assert_eq!(classify(0.0, 0.0), TrendDirection::Flat);
    assert_eq!(classify(0.0, 1.0), TrendDirection::Flat);
    assert_eq!(classify(0.5, 0.0), TrendDirection::Improving);
    assert_eq!(classify(-0.5, 0.0), TrendDirection::Declining);

    let history = vec![snap("c0", 9, 100)];
    let config = TrendConfig {
      flat_epsilon: f64::MIN_POSITIVE,
      ..TrendConfig::default()
    };
    let t = compute(&push("c1", 100), &history, &config);
    assert_eq!(t.direction, TrendDirection::Flat);
    assert!(t.summary.starts_with("quality stable at 100"));
  }

  #[test]
  fn loc_change_sums_window_and_current_push() {
    let mut older = snap("c1", 8, 90);
    older.loc_delta = 40;
    let mut newer = snap("c2", 9, 90);
    newer.loc_delta = -10;
    let mut current = push("c3", 90);
    current.loc_delta = 35;

    let t = compute(&current, &[newer, older], &TrendConfig::default());
    assert_eq!(t.loc_change, Some(65));
    assert_eq!(t.summary, "quality stable at 90 (baseline 90.0); codebase grew by 65 lines");
  }

  #[test]
  fn shrinking_codebase_and_complexity_are_noted() {
    let mut previous = snap("c1", 9, 70);
    previous.avg_complexity = Some(6.0);
    let mut current = push("c2", 80);
    current.loc_delta = -120;
    current.avg_complexity = Some(4.3);

    let t = compute(&current, &[previous], &TrendConfig::default());
    assert_eq!(t.loc_change, Some(-120));
    assert_eq!(t.complexity_change, Some(-1.7));
    assert_eq!(
      t.summary,
      "quality improved +10.0 points (70.0 → 80); codebase shrank by 120 lines; complexity fell by 1.7"
    );
  }

  #[test]
  fn small_changes_stay_out_of_the_summary() {
    let mut previous = snap("c1", 9, 80);
    previous.loc_delta = 20;
    let mut current = push("c2", 80);
    current.loc_delta = 30;
    current.avg_complexity = Some(2.5);

    let t = compute(&current, &[previous], &TrendConfig::default());
    assert_eq!(t.loc_change, Some(50));
    assert_eq!(t.complexity_change, Some(0.5));
    assert_eq!(t.summary, "quality stable at 80 (baseline 80.0)");
  }

  #[test]
  fn complexity_change_needs_both_sides() {
    let mut previous = snap("c1", 9, 80);
    previous.avg_complexity = None;
    let t = compute(&push("c2", 80), &[previous], &TrendConfig::default());
    assert_eq!(t.complexity_change, None);
    assert_eq!(t.loc_change, Some(0));
  }

  proptest! {
    #[test]
    fn direction_is_symmetric_around_baseline(
      scores in proptest::collection::vec(0u8..=100, 1..10),
      current in 0u8..=100,
      epsilon in 0.01f64..10.0,
    ) {
      let history: Vec<Snapshot> = scores
        .iter()
        .enumerate()
        .map(|(i, s)| snap(&format!("p{}", i), 1, *s))
        .collect();
      let config = TrendConfig { lookback: 100, lookback_days: None, flat_epsilon: epsilon };
      let t = compute(&push("now", current), &history, &config);
      let mean = scores.iter().map(|s| *s as f64).sum::<f64>() / scores.len() as f64;
      let delta = current as f64 - mean;
      let expected = if delta >= epsilon {
        TrendDirection::Improving
      } else if delta <= -epsilon {
        TrendDirection::Declining
      } else {
        TrendDirection::Flat
      };
      prop_assert_eq!(t.direction, expected);
    }
  }
}

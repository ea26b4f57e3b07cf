//! Markdown report rendering.
//!
//! Rendering is a pure function of the stored AnalysisResult: no clock reads,
//! so re-rendering the same result is byte-identical.

use serde::{Deserialize, Serialize};

use crate::integrity::is_binary_finding;
use crate::types::{AnalysisResult, Category, Finding, IntegrityStatus};

/// Rows shown per category before the remainder is summarized.
pub const MAX_ROWS_PER_CATEGORY: usize = 50;

/// Rendered report. Identity is the commit sha.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
  pub commit_sha: String,
  pub markdown: String,
  /// blake3 hex of `markdown`.
  pub digest: String,
}

pub fn render(result: &AnalysisResult) -> Report {
  let mut md = String::new();
  header(&mut md, result);
  summary(&mut md, result);
  findings(&mut md, &result.findings);
  trend(&mut md, result);
  recommendations_section(&mut md, result);
  review(&mut md, result);

  let digest = blake3::hash(md.as_bytes()).to_hex().to_string();
  Report {
    commit_sha: result.commit_sha.clone(),
    markdown: md,
    digest,
  }
}

fn header(md: &mut String, r: &AnalysisResult) {
  md.push_str("# Push Quality Report\n\n");
  md.push_str("| Field | Value |\n|-------|-------|\n");
  md.push_str(&format!("| Repository | `{}` |\n", cell(&r.repository)));
  md.push_str(&format!("| Branch | `{}` |\n", cell(&r.branch)));
  md.push_str(&format!("| Commit | `{}` |\n", short_sha(&r.commit_sha)));
  md.push_str(&format!("| Author | `{}` |\n", cell(&r.author)));
  if !r.commit_message.is_empty() {
    let first_line = r.commit_message.lines().next().unwrap_or_default();
    let message: String = first_line.chars().take(100).collect();
    md.push_str(&format!("| Message | {} |\n", cell(&message)));
  }
  md.push('\n');
}

fn summary(md: &mut String, r: &AnalysisResult) {
  let m = &r.metrics;
  md.push_str("## Summary\n\n");
  md.push_str("| Metric | Value |\n|--------|-------|\n");
  md.push_str(&format!("| Score | {}/100 |\n", r.score));
  md.push_str(&format!("| Grade | {} |\n", r.grade.as_str()));
  md.push_str(&format!("| Integrity | {} |\n", r.integrity_status.as_str()));
  md.push_str(&format!(
    "| Quality gate | {} |\n",
    if r.gate_passed { "passed" } else { "failed" }
  ));
  md.push_str(&format!(
    "| Lines | +{} / -{} (net {:+}) |\n",
    m.lines_added, m.lines_removed, m.loc_delta
  ));
  md.push_str(&format!(
    "| Files | {} changed, {} scored |\n",
    m.files_changed, m.files_scored
  ));
  md.push_str(&format!("| Avg complexity | {:.2} |\n", m.avg_complexity));
  md.push_str(&format!("| Comment ratio | {:.2} |\n", m.comment_ratio));
  md.push_str(&format!(
    "| Penalties | findings {}, complexity {} |\n\n",
    r.breakdown.findings_penalty, r.breakdown.complexity_penalty
  ));
}

fn findings(md: &mut String, all: &[Finding]) {
  md.push_str("## Findings\n\n");
  if all.is_empty() {
    md.push_str("No findings.\n\n");
    return;
  }
  for category in Category::ALL {
    let group: Vec<&Finding> = all.iter().filter(|f| f.category == category).collect();
    if group.is_empty() {
      continue;
    }
    md.push_str(&format!("### {} ({})\n\n", category.as_str(), group.len()));
    md.push_str("| File | Line | Severity | Message |\n|------|------|----------|---------|\n");
    for f in group.iter().take(MAX_ROWS_PER_CATEGORY) {
      let line = f.line.map(|l| l.to_string()).unwrap_or_else(|| "-".into());
      md.push_str(&format!(
        "| `{}` | {} | {} | {} |\n",
        cell(&f.file),
        line,
        f.severity.as_str(),
        cell(&f.message)
      ));
    }
    if group.len() > MAX_ROWS_PER_CATEGORY {
      md.push_str(&format!(
        "\n… and {} more\n",
        group.len() - MAX_ROWS_PER_CATEGORY
      ));
    }
    md.push('\n');
  }
}

fn trend(md: &mut String, r: &AnalysisResult) {
  let t = &r.trend;
  md.push_str("## Trend\n\n");
  md.push_str(&format!(
    "**{}** ({:+.1}): {}\n\n",
    t.direction.as_str(),
    t.magnitude,
    t.summary
  ));
  if let Some(prev) = &t.compared_against {
    md.push_str(&format!(
      "Compared against `{}` over {} snapshot(s).\n\n",
      short_sha(prev),
      t.samples
    ));
  }
  md.push_str("| Commit | Score |\n|--------|-------|\n");
  for p in &t.points {
    md.push_str(&format!("| `{}` | {} |\n", short_sha(&p.commit_sha), p.score));
  }
  md.push('\n');
}

fn recommendations_section(md: &mut String, r: &AnalysisResult) {
  md.push_str("## Recommendations\n\n");
  for rec in recommendations(r) {
    md.push_str(&format!("- {}\n", rec));
  }
  md.push('\n');
}

fn review(md: &mut String, r: &AnalysisResult) {
  md.push_str("## AI Review\n\n");
  match &r.opinion_text {
    Some(opinion) => {
      md.push_str(opinion.trim());
      md.push_str("\n\n");
      if !r.suggestions.is_empty() {
        md.push_str("### Suggestions\n\n");
        for s in &r.suggestions {
          md.push_str(&format!("- {}\n", s));
        }
        md.push('\n');
      }
    }
    None => md.push_str("AI review unavailable.\n"),
  }
}

/// Rule-based, actionable follow-ups derived from the result.
pub fn recommendations(r: &AnalysisResult) -> Vec<String> {
  let has = |c: Category| r.findings.iter().any(|f| f.category == c);
  let mut recs = Vec::new();

  if r.integrity_status == IntegrityStatus::Fail || has(Category::Secret) {
    recs.push(
      "CRITICAL: remove committed credentials, rotate them, and load secrets from the environment"
        .to_string(),
    );
  }
  if has(Category::DebugStatement) {
    recs.push("Clean up leftover debug code and disabled checks before merging".to_string());
  }
  if r.findings.iter().any(is_binary_finding) {
    recs.push("Move binary files to external storage (an artifact store or Git LFS)".to_string());
  }
  if has(Category::DeprecatedSymbol) {
    recs.push("Replace deprecated APIs with their supported alternatives".to_string());
  }
  if r.breakdown.complexity_penalty > 0 || has(Category::Complexity) {
    recs.push("Reduce branching complexity: extract smaller functions".to_string());
  }
  if r.metrics.lines_added > 300 && r.metrics.files_changed > 8 {
    recs.push("Split large changes into smaller, focused pushes".to_string());
  }
  if r.metrics.lines_added > 50 && r.metrics.comment_ratio < 0.05 {
    recs.push("Document the new code: under 5% of added lines are comments".to_string());
  }
  if recs.is_empty() {
    recs.push("No further recommendations. The change looks good.".to_string());
  }
  recs
}

fn short_sha(sha: &str) -> String {
  sha.chars().take(8).collect()
}

/// Keep user-supplied text from breaking table rows.
fn cell(s: &str) -> String {
  s.replace('|', "\\|").replace(['\r', '\n'], " ")
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::types::*;

  fn result() -> AnalysisResult {
    AnalysisResult {
      repository: "acme/api".into(),
      branch: "main".into(),
      commit_sha: "0123456789abcdef".into(),
      author: "dev".into(),
      commit_message: "add parser | tests".into(),
      timestamp: None,
      score: 72,
      grade: Grade::C,
      gate_passed: true,
      integrity_status: IntegrityStatus::Warn,
      content_hash: "h".into(),
      files_scanned: 1,
      metrics: ChangeSetMetrics {
        files_changed: 1,
        files_scored: 1,
        lines_added: 10,
        lines_removed: 2,
        loc_delta: 8,
        avg_complexity: 3.0,
        comment_ratio: 0.1,
      },
      breakdown: ScoreBreakdown::default(),
      findings: vec![Finding::new(
        Category::DebugStatement,
        Severity::Warn,
        "src/a.js",
        Some(3),
        "console output left in code: `console.log(x)`",
      )],
      trend: TrendDelta {
        direction: TrendDirection::Flat,
        magnitude: 0.0,
        compared_against: None,
        baseline: None,
        samples: 0,
        summary: "first analysis".into(),
        loc_change: None,
        complexity_change: None,
        points: vec![TrendPoint {
          commit_sha: "0123456789abcdef".into(),
          score: 72,
        }],
      },
      opinion_text: None,
      suggestions: vec![],
    }
  }

  #[test]
  fn rendering_is_byte_identical() {
    let r = result();
    let a = render(&r);
    let b = render(&r);
    assert_eq!(a, b);
    assert_eq!(a.commit_sha, r.commit_sha);
    assert_eq!(a.digest.len(), 64);
  }

  #[test]
  fn missing_opinion_degrades_gracefully() {
    let report = render(&result());
    assert!(report.markdown.contains("AI review unavailable"));
  }

  #[test]
  fn opinion_and_suggestions_rendered() {
    let mut r = result();
    r.opinion_text = Some("Solid change.".into());
    r.suggestions = vec!["Add a test".into()];
    let md = render(&r).markdown;
    assert!(md.contains("Solid change."));
    assert!(md.contains("- Add a test"));
    assert!(!md.contains("AI review unavailable"));
  }

  #[test]
  fn sections_in_order() {
    let md = render(&result()).markdown;
    let order = ["## Summary", "## Findings", "## Trend", "## Recommendations", "## AI Review"];
    let positions: Vec<usize> = order.iter().map(|s| md.find(s).unwrap()).collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]));
    assert!(md.contains("`01234567`"));
  }

  #[test]
  fn pipes_in_user_text_are_escaped() {
    let md = render(&result()).markdown;
    assert!(md.contains("add parser \\| tests"));
  }

  #[test]
  fn long_categories_are_capped() {
    let mut r = result();
    r.findings = (0..60)
      .map(|i| Finding::new(Category::DeprecatedSymbol, Severity::Warn, "a.py", Some(i), "old"))
      .collect();
    let md = render(&r).markdown;
    assert!(md.contains("… and 10 more"));
    assert_eq!(md.matches("| `a.py` |").count(), MAX_ROWS_PER_CATEGORY);
  }

  #[test]
  fn recommendations_follow_findings() {
    let r = result();
    let recs = recommendations(&r);
    assert_eq!(recs.len(), 1);
    assert!(recs[0].contains("debug"));

    let mut clean = result();
    clean.findings.clear();
    assert!(recommendations(&clean)[0].starts_with("No further recommendations"));
  }

  #[test]
  fn binary_findings_recommend_external_storage() {
    let mut r = result();
    r.findings = vec![Finding::new(
      Category::Style,
      Severity::Warn,
      "dist/app.exe",
      None,
      format!(
        "{} (`.exe` extension); keep binaries out of the repository",
        crate::integrity::BINARY_FINDING
      ),
    )];
    let recs = recommendations(&r);
    assert_eq!(recs.len(), 1);
    assert!(recs[0].starts_with("Move binary files to external storage"));

    // Other style findings do not trigger it.
    r.findings[0].message = "800 lines added in one file; consider splitting the change".into();
    assert!(recommendations(&r)[0].starts_with("No further recommendations"));
  }
}

//! External review collaborator.
//!
//! Best-effort only: the engine bounds every call with a timeout and turns
//! any failure into an absent opinion.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ReviewError;
use crate::types::ChangeSet;

/// Opinion text plus actionable suggestions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
  pub opinion: String,
  #[serde(default)]
  pub suggestions: Vec<String>,
}

#[async_trait]
pub trait Reviewer: Send + Sync {
  async fn review(&self, changeset: &ChangeSet, timeout: Duration) -> Result<Review, ReviewError>;
}

/// Used when no review endpoint is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledReviewer;

#[async_trait]
impl Reviewer for DisabledReviewer {
  async fn review(&self, _changeset: &ChangeSet, _timeout: Duration) -> Result<Review, ReviewError> {
    Err(ReviewError::Unavailable("no review endpoint configured".into()))
  }
}

// ---------------------------------------------------------------------------
// HttpReviewer
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ReviewRequest<'a> {
  repository: &'a str,
  branch: &'a str,
  commit_sha: &'a str,
  commit_message: &'a str,
  diff: String,
}

/// Either a structured review or free Markdown text.
#[derive(Debug, Default, Deserialize)]
struct ReviewResponse {
  #[serde(default)]
  opinion: Option<String>,
  #[serde(default)]
  suggestions: Vec<String>,
  #[serde(default)]
  text: Option<String>,
}

/// POSTs the change set as JSON to a review service.
#[derive(Debug, Clone)]
pub struct HttpReviewer {
  endpoint: String,
  max_diff_chars: usize,
  client: reqwest::Client,
}

impl HttpReviewer {
  pub fn new(endpoint: impl Into<String>, max_diff_chars: usize) -> Result<Self, ReviewError> {
    let client = reqwest::Client::builder()
      .user_agent(concat!("quality-engine/", env!("CARGO_PKG_VERSION")))
      .build()?;
    Ok(Self {
      endpoint: endpoint.into(),
      max_diff_chars,
      client,
    })
  }

  pub fn endpoint(&self) -> &str {
    &self.endpoint
  }
}

#[async_trait]
impl Reviewer for HttpReviewer {
  async fn review(&self, changeset: &ChangeSet, timeout: Duration) -> Result<Review, ReviewError> {
    let body = ReviewRequest {
      repository: &changeset.repository,
      branch: &changeset.branch,
      commit_sha: &changeset.commit_sha,
      commit_message: &changeset.commit_message,
      diff: combined_diff(changeset, self.max_diff_chars),
    };
    debug!(endpoint = %self.endpoint, diff_chars = body.diff.chars().count(), "requesting review");

    let response: ReviewResponse = self
      .client
      .post(&self.endpoint)
      .timeout(timeout)
      .json(&body)
      .send()
      .await?
      .error_for_status()?
      .json()
      .await?;

    match (response.opinion, response.text) {
      (Some(opinion), _) if !opinion.trim().is_empty() => Ok(Review {
        opinion: opinion.trim().to_string(),
        suggestions: response.suggestions,
      }),
      (_, Some(text)) if !text.trim().is_empty() => Ok(parse_review_text(&text)),
      _ => Err(ReviewError::Unavailable("empty review response".into())),
    }
  }
}

/// All file diffs behind `--- path` headers, cut to `max_chars` characters.
pub fn combined_diff(changeset: &ChangeSet, max_chars: usize) -> String {
  let mut out = String::new();
  for f in &changeset.files {
    out.push_str(&format!("--- {}\n{}\n", f.path, f.diff));
  }
  if out.chars().count() > max_chars {
    out = out.chars().take(max_chars).collect();
  }
  out
}

/// Split Markdown review text into opinion and suggestions by section
/// heading. Without an opinion heading the whole text is the opinion.
pub fn parse_review_text(text: &str) -> Review {
  let mut sections: Vec<(String, Vec<&str>)> = Vec::new();
  for line in text.lines() {
    let trimmed = line.trim();
    if trimmed.starts_with('#') {
      let heading = trimmed.trim_start_matches('#').trim().to_lowercase();
      sections.push((heading, Vec::new()));
    } else if let Some((_, body)) = sections.last_mut() {
      body.push(line);
    }
  }

  let mut opinion = None;
  let mut suggestions = Vec::new();
  for (heading, body) in &sections {
    if opinion.is_none() && heading.contains("opinion") {
      opinion = Some(body.join("\n").trim().to_string());
    } else if heading.contains("suggestion") || heading.contains("improvement") {
      suggestions.extend(bullets(body));
    }
  }

  Review {
    opinion: opinion
      .filter(|o| !o.is_empty())
      .unwrap_or_else(|| text.trim().to_string()),
    suggestions,
  }
}

fn bullets(lines: &[&str]) -> Vec<String> {
  lines
    .iter()
    .map(|l| l.trim())
    .filter(|l| l.starts_with(['-', '*', '+']) || l.starts_with(|c: char| c.is_ascii_digit()))
    .map(|l| {
      l.trim_start_matches(|c: char| c.is_ascii_digit() || matches!(c, '-' | '*' | '+' | '.' | ')' | ' '))
        .trim()
        .to_string()
    })
    .filter(|l| !l.is_empty())
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::types::FileDiff;

  fn changeset() -> ChangeSet {
    ChangeSet {
      repository: "acme/api".into(),
      branch: "main".into(),
      commit_sha: "abc".into(),
      author: "dev".into(),
      commit_message: "msg".into(),
      timestamp: None,
      files: vec![FileDiff {
        path: "a.rs".into(),
        added: 1,
        removed: 0,
        diff: "+fn a() {}".into(),
      }],
    }
  }

  #[test]
  fn parses_sections_and_bullets() {
    let text = "## Opinion\nClean, focused change.\n\n## Code smells\n- none\n\n## Suggestions\n- Add tests\n* Rename `x`\n2. Split module\n";
    let review = parse_review_text(text);
    assert_eq!(review.opinion, "Clean, focused change.");
    assert_eq!(review.suggestions, vec!["Add tests", "Rename `x`", "Split module"]);
  }

  #[test]
  fn improvements_heading_counts_as_suggestions() {
    let review = parse_review_text("# General opinion\nok\n# Improvements\n- one\n");
    assert_eq!(review.suggestions, vec!["one"]);
  }

  #[test]
  fn unstructured_text_is_the_opinion() {
    let review = parse_review_text("  Looks fine to me.  ");
    assert_eq!(review.opinion, "Looks fine to me.");
    assert!(review.suggestions.is_empty());
  }

  #[test]
  fn combined_diff_is_truncated() {
    let diff = combined_diff(&changeset(), 8);
    assert_eq!(diff, "--- a.rs");
    assert!(combined_diff(&changeset(), 1000).contains("+fn a() {}"));
  }

  #[tokio::test]
  async fn disabled_reviewer_is_unavailable() {
    let err = DisabledReviewer
      .review(&changeset(), Duration::from_millis(10))
      .await
      .unwrap_err();
    assert!(matches!(err, ReviewError::Unavailable(_)));
  }

  #[tokio::test]
  async fn http_reviewer_unreachable_endpoint_errors() {
    let reviewer = HttpReviewer::new("http://127.0.0.1:9/review", 100).unwrap();
    let result = reviewer.review(&changeset(), Duration::from_millis(200)).await;
    assert!(result.is_err());
  }
}

//! Validate an untrusted push description into a canonical ChangeSet.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::config::IngestConfig;
use crate::diff;
use crate::error::EngineError;
use crate::types::*;

/// Parse and validate an InboundPush. No side effects.
pub fn ingest(raw: &InboundPush, config: &IngestConfig) -> Result<ChangeSet, EngineError> {
  let repository = required("repository", &raw.repository)?;
  let branch = required("branch", &raw.branch)?;
  let commit_sha = required("commit_sha", &raw.commit_sha)?;
  let author = required("author", &raw.author)?;

  let timestamp: Option<DateTime<Utc>> = match raw.timestamp.as_deref().map(str::trim) {
    None | Some("") => None,
    Some(t) => Some(
      DateTime::parse_from_rfc3339(t)
        .map_err(|e| EngineError::invalid("timestamp", &format!("invalid RFC3339: {}", e)))?
        .with_timezone(&Utc),
    ),
  };

  if raw.files.is_empty() {
    return Err(EngineError::invalid("files", "must have at least one file"));
  }
  if raw.files.len() > config.max_files {
    return Err(EngineError::invalid(
      "files",
      &format!(
        "{} files exceeds the maximum of {}",
        raw.files.len(),
        config.max_files
      ),
    ));
  }

  let mut seen = HashSet::with_capacity(raw.files.len());
  let mut files = Vec::with_capacity(raw.files.len());

  for f in &raw.files {
    let path = normalize_path(&f.path)?;
    if !seen.insert(path.clone()) {
      return Err(EngineError::invalid(
        "files[].path",
        &format!("duplicate path {}", path),
      ));
    }

    let text = f.diff.clone().unwrap_or_default();
    if text.len() > config.max_diff_bytes {
      return Err(EngineError::invalid(
        "files[].diff",
        &format!("diff for {} exceeds {} bytes", path, config.max_diff_bytes),
      ));
    }

    let (added, removed) = match &f.diff {
      Some(d) => diff::count_changes(d),
      None => (f.additions.unwrap_or(0), f.deletions.unwrap_or(0)),
    };

    files.push(FileDiff {
      path,
      added,
      removed,
      diff: text,
    });
  }

  Ok(ChangeSet {
    repository,
    branch,
    commit_sha,
    author,
    commit_message: raw
      .commit_message
      .as_deref()
      .map(str::trim)
      .unwrap_or_default()
      .to_string(),
    timestamp,
    files,
  })
}

fn required(field: &str, value: &str) -> Result<String, EngineError> {
  let v = value.trim();
  if v.is_empty() {
    return Err(EngineError::invalid(field, "must not be empty"));
  }
  Ok(v.to_string())
}

/// Normalize a file path for stable comparison:
/// - backslash -> forward slash
/// - collapse repeated slashes
/// - strip leading / and ./
/// - reject `..` segments
///
/// Case is preserved.
pub fn normalize_path(p: &str) -> Result<String, EngineError> {
  let s = p.trim().replace('\\', "/");
  let mut segments = Vec::new();
  for seg in s.split('/') {
    match seg {
      "" | "." => continue,
      ".." => {
        return Err(EngineError::invalid(
          "files[].path",
          &format!("path traversal in {}", p),
        ))
      }
      _ => segments.push(seg),
    }
  }
  if segments.is_empty() {
    return Err(EngineError::invalid("files[].path", "must not be empty"));
  }
  Ok(segments.join("/"))
}

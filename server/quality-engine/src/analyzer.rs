//! Static analyzer: per-file size deltas, a branching-token complexity proxy,
//! and comment density of added lines.
//!
//! Language-agnostic token scan, not a parser. Ignored (generated / vendored)
//! files count toward raw line stats but not toward scoring.

use tracing::debug;

use crate::config::AnalyzerConfig;
use crate::diff::ParsedFile;
use crate::error::ConfigError;
use crate::types::{Category, ChangeSetMetrics, Finding, Severity};

/// Compiled ignore globs.
#[derive(Debug, Clone, Default)]
pub struct IgnoreSet {
  patterns: Vec<glob::Pattern>,
}

impl IgnoreSet {
  pub fn new(globs: &[String]) -> Result<Self, ConfigError> {
    let patterns = globs
      .iter()
      .map(|g| {
        glob::Pattern::new(g).map_err(|source| ConfigError::Glob {
          pattern: g.clone(),
          source,
        })
      })
      .collect::<Result<Vec<_>, _>>()?;
    Ok(Self { patterns })
  }

  pub fn is_ignored(&self, path: &str) -> bool {
    self.patterns.iter().any(|p| p.matches(path))
  }
}

/// Metrics for one changed file.
#[derive(Debug, Clone, PartialEq)]
pub struct FileMetrics {
  pub path: String,
  pub added: u32,
  pub removed: u32,
  pub net_delta: i64,
  pub complexity: u32,
  pub comment_lines: u32,
  pub nonblank_lines: u32,
  pub ignored: bool,
  pub malformed: bool,
}

impl FileMetrics {
  pub fn comment_ratio(&self) -> f64 {
    if self.nonblank_lines == 0 {
      0.0
    } else {
      self.comment_lines as f64 / self.nonblank_lines as f64
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StaticAnalysis {
  pub files: Vec<FileMetrics>,
  pub metrics: ChangeSetMetrics,
  pub findings: Vec<Finding>,
}

const BRANCH_KEYWORDS: [&str; 15] = [
  "if", "elif", "elsif", "elseif", "for", "foreach", "while", "case", "catch", "except", "when",
  "unless", "until", "guard", "rescue",
];

/// Analyze every parsed file and aggregate changeset-level metrics.
pub fn analyze(files: &[ParsedFile<'_>], config: &AnalyzerConfig) -> StaticAnalysis {
  let mut out_files = Vec::with_capacity(files.len());
  let mut findings = Vec::new();

  for parsed in files {
    let metrics = file_metrics(parsed);

    if !metrics.ignored {
      if metrics.malformed {
        findings.push(Finding::new(
          Category::Style,
          Severity::Info,
          &metrics.path,
          None,
          "unparsable diff hunk; metrics skipped for this file",
        ));
      }
      if metrics.complexity > config.file_complexity_threshold {
        findings.push(Finding::new(
          Category::Complexity,
          Severity::Info,
          &metrics.path,
          None,
          format!(
            "{} branching tokens added (threshold {})",
            metrics.complexity, config.file_complexity_threshold
          ),
        ));
      }
      if metrics.added > config.large_file_additions {
        findings.push(Finding::new(
          Category::Style,
          Severity::Info,
          &metrics.path,
          None,
          format!(
            "{} lines added in one file; consider splitting the change",
            metrics.added
          ),
        ));
      }
    }

    out_files.push(metrics);
  }

  let metrics = aggregate(&out_files);
  debug!(
    files = metrics.files_changed,
    scored = metrics.files_scored,
    avg_complexity = metrics.avg_complexity,
    "static analysis complete"
  );

  StaticAnalysis {
    files: out_files,
    metrics,
    findings,
  }
}

fn file_metrics(parsed: &ParsedFile<'_>) -> FileMetrics {
  let file = parsed.file;
  let mut metrics = FileMetrics {
    path: file.path.clone(),
    added: file.added,
    removed: file.removed,
    net_delta: file.added as i64 - file.removed as i64,
    complexity: 0,
    comment_lines: 0,
    nonblank_lines: 0,
    ignored: parsed.ignored,
    malformed: parsed.diff.malformed,
  };
  // Malformed diffs degrade to zero metrics.
  if metrics.ignored || metrics.malformed {
    return metrics;
  }

  for added in &parsed.diff.added {
    let trimmed = added.text.trim();
    if trimmed.is_empty() {
      continue;
    }
    metrics.nonblank_lines += 1;
    if is_comment(trimmed) {
      metrics.comment_lines += 1;
    } else {
      metrics.complexity += branch_tokens(trimmed);
    }
  }
  metrics
}

fn aggregate(files: &[FileMetrics]) -> ChangeSetMetrics {
  let mut m = ChangeSetMetrics {
    files_changed: files.len(),
    ..ChangeSetMetrics::default()
  };

  let mut complexity_sum = 0u64;
  let mut comment_lines = 0u64;
  let mut nonblank_lines = 0u64;

  for f in files {
    m.lines_added += f.added as u64;
    m.lines_removed += f.removed as u64;
    m.loc_delta += f.net_delta;
    if f.ignored {
      continue;
    }
    m.files_scored += 1;
    complexity_sum += f.complexity as u64;
    comment_lines += f.comment_lines as u64;
    nonblank_lines += f.nonblank_lines as u64;
  }

  if m.files_scored > 0 {
    m.avg_complexity = round2(complexity_sum as f64 / m.files_scored as f64);
  }
  if nonblank_lines > 0 {
    m.comment_ratio = round2(comment_lines as f64 / nonblank_lines as f64);
  }
  m
}

/// Count branching keywords and boolean short-circuit operators.
pub fn branch_tokens(line: &str) -> u32 {
  let mut count = 0u32;
  let mut word = String::new();
  for ch in line.chars().chain(std::iter::once(' ')) {
    if ch.is_alphanumeric() || ch == '_' {
      word.push(ch);
    } else {
      if BRANCH_KEYWORDS.contains(&word.as_str()) {
        count += 1;
      }
      word.clear();
    }
  }
  count + line.matches("&&").count() as u32 + line.matches("||").count() as u32
}

/// Whole-line comment in any of the common syntaxes.
pub fn is_comment(trimmed: &str) -> bool {
  const PREFIXES: [&str; 8] = ["//", "/*", "*", "--", ";", "<!--", "\"\"\"", "'''"];
  if PREFIXES.iter().any(|p| trimmed.starts_with(p)) {
    return true;
  }
  if let Some(rest) = trimmed.strip_prefix('#') {
    // Shebangs, attributes and preprocessor directives are code.
    const DIRECTIVES: [&str; 11] = [
      "include", "define", "if", "ifdef", "ifndef", "endif", "else", "elif", "pragma", "import",
      "undef",
    ];
    if rest.starts_with('!') || rest.starts_with('[') {
      return false;
    }
    let word: String = rest.chars().take_while(|c| c.is_ascii_alphabetic()).collect();
    return !DIRECTIVES.contains(&word.as_str());
  }
  false
}

fn round2(x: f64) -> f64 {
  (x * 100.0).round() / 100.0
}

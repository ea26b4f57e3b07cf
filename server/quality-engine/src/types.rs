//! Core types for the quality engine (JSON contracts + internal models).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Inbound types (JSON contract — what the caller sends)
// ---------------------------------------------------------------------------

/// One push description. Unknown fields are silently ignored; missing
/// strings default to empty so validation can name the field.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InboundPush {
  #[serde(default)]
  pub repository: String,
  #[serde(default)]
  pub branch: String,
  #[serde(default)]
  pub commit_sha: String,
  #[serde(default)]
  pub author: String,
  #[serde(default)]
  pub commit_message: Option<String>,
  #[serde(default)]
  pub timestamp: Option<String>,
  #[serde(default)]
  pub files: Vec<InboundFile>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InboundFile {
  #[serde(default)]
  pub path: String,
  #[serde(default)]
  pub diff: Option<String>,
  #[serde(default)]
  pub additions: Option<u32>,
  #[serde(default)]
  pub deletions: Option<u32>,
}

// ---------------------------------------------------------------------------
// Canonical change set
// ---------------------------------------------------------------------------

/// One changed file after normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDiff {
  pub path: String,
  pub added: u32,
  pub removed: u32,
  pub diff: String,
}

impl FileDiff {
  /// Lowercased extension without the dot, if any.
  pub fn extension(&self) -> Option<String> {
    let name = self.path.rsplit('/').next()?;
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
      return None;
    }
    Some(ext.to_ascii_lowercase())
  }
}

/// Canonical representation of one push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
  pub repository: String,
  pub branch: String,
  pub commit_sha: String,
  pub author: String,
  pub commit_message: String,
  pub timestamp: Option<DateTime<Utc>>,
  pub files: Vec<FileDiff>,
}

// ---------------------------------------------------------------------------
// Findings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
  Info,
  Warn,
  Fail,
}

impl Severity {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Info => "info",
      Self::Warn => "warn",
      Self::Fail => "fail",
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
  Secret,
  DebugStatement,
  DeprecatedSymbol,
  Complexity,
  Style,
}

impl Category {
  /// Fixed report order.
  pub const ALL: [Category; 5] = [
    Category::Secret,
    Category::DebugStatement,
    Category::DeprecatedSymbol,
    Category::Complexity,
    Category::Style,
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      Self::Secret => "secret",
      Self::DebugStatement => "debug-statement",
      Self::DeprecatedSymbol => "deprecated-symbol",
      Self::Complexity => "complexity",
      Self::Style => "style",
    }
  }
}

/// A single detected issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
  pub category: Category,
  pub severity: Severity,
  pub file: String,
  pub line: Option<u32>,
  pub message: String,
}

impl Finding {
  pub fn new(
    category: Category,
    severity: Severity,
    file: &str,
    line: Option<u32>,
    message: impl Into<String>,
  ) -> Self {
    Self {
      category,
      severity,
      file: file.to_string(),
      line,
      message: message.into(),
    }
  }
}

// ---------------------------------------------------------------------------
// Stage outputs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntegrityStatus {
  Pass,
  Warn,
  Fail,
}

impl IntegrityStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Pass => "pass",
      Self::Warn => "warn",
      Self::Fail => "fail",
    }
  }
}

/// Changeset-level structural metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeSetMetrics {
  pub files_changed: usize,
  pub files_scored: usize,
  pub lines_added: u64,
  pub lines_removed: u64,
  pub loc_delta: i64,
  pub avg_complexity: f64,
  pub comment_ratio: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Grade {
  A,
  B,
  C,
  D,
  F,
}

impl Grade {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::A => "A",
      Self::B => "B",
      Self::C => "C",
      Self::D => "D",
      Self::F => "F",
    }
  }
}

/// Where the points went.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
  pub info_findings: usize,
  pub warn_findings: usize,
  pub fail_findings: usize,
  pub findings_penalty: u32,
  pub complexity_penalty: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
  Improving,
  Declining,
  Flat,
}

impl TrendDirection {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Improving => "improving",
      Self::Declining => "declining",
      Self::Flat => "flat",
    }
  }
}

/// One score on the trend chart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrendPoint {
  pub commit_sha: String,
  pub score: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendDelta {
  pub direction: TrendDirection,
  pub magnitude: f64,
  pub compared_against: Option<String>,
  pub baseline: Option<f64>,
  pub samples: usize,
  pub summary: String,
  /// Net lines the branch gained across the window and the current push.
  #[serde(default)]
  pub loc_change: Option<i64>,
  /// Current average complexity minus that of `compared_against`.
  #[serde(default)]
  pub complexity_change: Option<f64>,
  /// Window oldest-first, then the current push.
  pub points: Vec<TrendPoint>,
}

// ---------------------------------------------------------------------------
// Output types (JSON contract — what we emit)
// ---------------------------------------------------------------------------

/// The pipeline's output for one change set. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
  pub repository: String,
  pub branch: String,
  pub commit_sha: String,
  pub author: String,
  pub commit_message: String,
  pub timestamp: Option<DateTime<Utc>>,
  pub score: u8,
  pub grade: Grade,
  pub gate_passed: bool,
  pub integrity_status: IntegrityStatus,
  pub content_hash: String,
  pub files_scanned: usize,
  pub metrics: ChangeSetMetrics,
  pub breakdown: ScoreBreakdown,
  pub findings: Vec<Finding>,
  pub trend: TrendDelta,
  pub opinion_text: Option<String>,
  pub suggestions: Vec<String>,
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

/// Lightweight historical record used solely as trend input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
  pub repository: String,
  pub branch: String,
  pub commit_sha: String,
  pub timestamp: DateTime<Utc>,
  pub score: u8,
  pub loc_delta: i64,
  /// Absent on records written before complexity was tracked.
  #[serde(default)]
  pub avg_complexity: Option<f64>,
}

/// What the history store persists per analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
  pub snapshot: Snapshot,
  pub result: AnalysisResult,
}

// ---------------------------------------------------------------------------
// CLI stream wrappers
// ---------------------------------------------------------------------------

/// Structured error output for rejected payloads.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorOutput {
  pub error: bool,
  pub message: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub field: Option<String>,
}

impl ErrorOutput {
  pub fn new(message: impl Into<String>) -> Self {
    Self {
      error: true,
      message: message.into(),
      field: None,
    }
  }

  pub fn with_field(mut self, field: impl Into<String>) -> Self {
    self.field = Some(field.into());
    self
  }
}

//! Engine configuration with sane defaults.
//!
//! Every section is `#[serde(default)]`, so a TOML file only has to name the
//! values it overrides.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
  pub ingest: IngestConfig,
  pub analyzer: AnalyzerConfig,
  pub integrity: IntegrityConfig,
  pub deprecation: DeprecationConfig,
  pub score: ScoreConfig,
  pub trend: TrendConfig,
  pub review: ReviewConfig,
  pub history: HistoryConfig,
}

impl Config {
  /// Load a TOML config file and validate it.
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    let raw = std::fs::read_to_string(path)?;
    Self::from_toml_str(&raw)
  }

  pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
    let config: Config = toml::from_str(raw)?;
    config.validate()?;
    Ok(config)
  }

  /// Reject values that would break determinism or the grade table.
  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.ingest.max_files == 0 {
      return Err(ConfigError::invalid("ingest.max_files must be at least 1"));
    }
    if self.trend.lookback == 0 {
      return Err(ConfigError::invalid("trend.lookback must be at least 1"));
    }
    if !(self.trend.flat_epsilon > 0.0) {
      return Err(ConfigError::invalid("trend.flat_epsilon must be > 0"));
    }
    if matches!(self.trend.lookback_days, Some(d) if d <= 0) {
      return Err(ConfigError::invalid("trend.lookback_days must be positive"));
    }
    if !(self.score.complexity_penalty >= 0.0) {
      return Err(ConfigError::invalid("score.complexity_penalty must be >= 0"));
    }
    let g = &self.score.grades;
    if !(g.a <= 100 && g.a > g.b && g.b > g.c && g.c > g.d && g.d > 0) {
      return Err(ConfigError::invalid(format!(
        "score.grades must satisfy 100 >= a > b > c > d > 0 (got a={} b={} c={} d={})",
        g.a, g.b, g.c, g.d
      )));
    }
    if self.score.gate_threshold > 100 {
      return Err(ConfigError::invalid("score.gate_threshold must be <= 100"));
    }
    Ok(())
  }
}

// ---------------------------------------------------------------------------
// Ingest
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
  /// Upper bound on files per push.
  pub max_files: usize,
  /// Upper bound on one file's diff text, in bytes.
  pub max_diff_bytes: usize,
}

impl Default for IngestConfig {
  fn default() -> Self {
    Self {
      max_files: 500,
      max_diff_bytes: 2_000_000,
    }
  }
}

// ---------------------------------------------------------------------------
// Static analyzer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
  /// Generated / vendored paths excluded from scoring.
  pub ignore_globs: Vec<String>,
  /// Per-file branching-token count that raises a complexity finding.
  pub file_complexity_threshold: u32,
  /// Per-file added lines that raise a "consider splitting" finding.
  pub large_file_additions: u32,
}

impl Default for AnalyzerConfig {
  fn default() -> Self {
    Self {
      ignore_globs: [
        "vendor/**",
        "**/vendor/**",
        "node_modules/**",
        "**/node_modules/**",
        "dist/**",
        "**/*.min.js",
        "*.lock",
        "**/*.lock",
        "package-lock.json",
        "**/package-lock.json",
        "**/generated/**",
        "**/*.generated.*",
        "**/*.pb.go",
      ]
      .iter()
      .map(|s| s.to_string())
      .collect(),
      file_complexity_threshold: 15,
      large_file_additions: 800,
    }
  }
}

// ---------------------------------------------------------------------------
// Integrity
// ---------------------------------------------------------------------------

/// A named regex. Secret rules may capture the value to redact as `secret`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternRule {
  pub name: String,
  pub pattern: String,
}

impl PatternRule {
  pub fn new(name: &str, pattern: &str) -> Self {
    Self {
      name: name.to_string(),
      pattern: pattern.to_string(),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegrityConfig {
  pub secret_patterns: Vec<PatternRule>,
  pub debug_patterns: Vec<PatternRule>,
  /// Minimum quoted-literal length considered for the entropy rule.
  pub entropy_min_length: usize,
  /// Shannon entropy (bits/char) at or above which a literal is a secret.
  pub entropy_threshold: f64,
  /// File extensions (no dot, any case) flagged as committed binaries.
  pub binary_extensions: Vec<String>,
}

impl Default for IntegrityConfig {
  fn default() -> Self {
    Self {
      secret_patterns: default_secret_patterns(),
      debug_patterns: default_debug_patterns(),
      entropy_min_length: 32,
      entropy_threshold: 4.5,
      binary_extensions: [
        "exe", "dll", "so", "dylib", "bin", "zip", "tar", "gz", "jar", "7z", "rar", "class", "pyc",
        "o", "a",
      ]
      .iter()
      .map(|e| e.to_string())
      .collect(),
    }
  }
}

fn default_secret_patterns() -> Vec<PatternRule> {
  vec![
    PatternRule::new(
      "private key header",
      r"-----BEGIN (?:RSA |DSA |EC |OPENSSH |PGP |ENCRYPTED )?PRIVATE KEY-----",
    ),
    PatternRule::new("aws access key id", r"\b(?P<secret>AKIA[0-9A-Z]{16})\b"),
    PatternRule::new(
      "aws credential assignment",
      r#"(?i)(?:aws_access_key_id|aws_secret_access_key)\s*[:=]\s*['"]?(?P<secret>[A-Za-z0-9/+=]{16,})"#,
    ),
    PatternRule::new(
      "api key assignment",
      r#"(?i)(?:api[_-]?key|api[_-]?secret|secret[_-]?key|access[_-]?token|auth[_-]?token|client[_-]?secret)\b['"]?\s*[:=]\s*['"]?(?P<secret>[A-Za-z0-9_\-./+=]{8,})"#,
    ),
    PatternRule::new(
      "password literal",
      r#"(?i)(?:password|passwd|pwd)['"]?\s*[:=]\s*['"](?P<secret>[^'"\s]{4,})['"]"#,
    ),
    PatternRule::new(
      "password env assignment",
      r"^\s*(?:export\s+)?[A-Z0-9_]*PASSWORD\s*=\s*(?P<secret>[^\s'\x22]{4,})",
    ),
    PatternRule::new(
      "connection string credentials",
      r"\b[a-zA-Z][a-zA-Z0-9+.\-]*://[^\s:/@]+:(?P<secret>[^\s@/]+)@",
    ),
    PatternRule::new("bearer token", r"(?i)\bbearer\s+(?P<secret>[A-Za-z0-9\-_.=]{20,})"),
    PatternRule::new("provider api key", r"\b(?P<secret>sk-[A-Za-z0-9_\-]{16,})"),
    PatternRule::new("github token", r"\b(?P<secret>gh[pousr]_[A-Za-z0-9]{36,})"),
    PatternRule::new("slack token", r"\b(?P<secret>xox[abprs]-[A-Za-z0-9\-]{10,})"),
    PatternRule::new("google api key", r"\b(?P<secret>AIza[0-9A-Za-z_\-]{35})"),
  ]
}

fn default_debug_patterns() -> Vec<PatternRule> {
  vec![
    PatternRule::new("console output", r"\bconsole\.(?:log|debug|trace)\s*\("),
    PatternRule::new("debugger statement", r"^\s*debugger\b"),
    PatternRule::new("debug print", r"(?i)\bprint(?:ln)?\s*\(.*debug"),
    PatternRule::new("dbg macro", r"\bdbg!\s*\("),
    PatternRule::new(
      "breakpoint",
      r"\b(?:pdb|ipdb)\.set_trace\s*\(|\bbreakpoint\s*\(\s*\)|\bbinding\.pry\b",
    ),
    PatternRule::new("variable dump", r"\b(?:var_dump|print_r)\s*\("),
    PatternRule::new("todo hack", r"(?i)\bTODO\b.*\bHACK\b"),
    PatternRule::new(
      "disabled test",
      r"\b(?:it|describe|test)\.skip\s*\(|\bx(?:it|describe)\s*\(|@pytest\.mark\.skip|@unittest\.skip|@Disabled\b|@Ignore\b|#\[ignore\]",
    ),
    PatternRule::new(
      "disabled security check",
      r"(?i)\bverify\s*=\s*false\b|rejectUnauthorized\s*:\s*false|InsecureSkipVerify\s*:\s*true|danger_accept_invalid_certs\s*\(\s*true|\bssl_verify\s*[:=]\s*false|#\s*nosec\b",
    ),
    PatternRule::new("suppressed lint", r"eslint-disable|@ts-ignore\b|#\s*type:\s*ignore\b"),
  ]
}

// ---------------------------------------------------------------------------
// Deprecation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchKind {
  #[default]
  Exact,
  Regex,
}

/// One deny-list entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DenyRule {
  pub pattern: String,
  #[serde(default)]
  pub kind: MatchKind,
  #[serde(default)]
  pub message: String,
  /// File extensions (without dot) the rule applies to; empty = all files.
  #[serde(default)]
  pub extensions: Vec<String>,
}

impl DenyRule {
  fn regex(pattern: &str, message: &str, extensions: &[&str]) -> Self {
    Self {
      pattern: pattern.to_string(),
      kind: MatchKind::Regex,
      message: message.to_string(),
      extensions: extensions.iter().map(|e| e.to_string()).collect(),
    }
  }

  fn exact(pattern: &str, message: &str, extensions: &[&str]) -> Self {
    Self {
      kind: MatchKind::Exact,
      ..Self::regex(pattern, message, extensions)
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeprecationConfig {
  pub rules: Vec<DenyRule>,
}

impl Default for DeprecationConfig {
  fn default() -> Self {
    const PY: &[&str] = &["py"];
    const JS: &[&str] = &["js", "jsx", "ts", "tsx", "mjs", "cjs"];
    const JAVA: &[&str] = &["java"];
    const GO: &[&str] = &["go"];
    Self {
      rules: vec![
        DenyRule::regex(r"\bos\.popen\b", "use subprocess.run() instead", PY),
        DenyRule::regex(r"\boptparse\b", "use argparse instead", PY),
        DenyRule::regex(r"\bimport\s+imp\b", "use importlib instead", PY),
        DenyRule::regex(r"\bpkg_resources\b", "use importlib.metadata instead", PY),
        DenyRule::regex(r"@?\basyncio\.coroutine\b", "use async def instead", PY),
        DenyRule::regex(
          r"\bcollections\.(?:Mapping|MutableMapping|Sequence|MutableSequence|Set)\b",
          "abstract base classes moved to collections.abc",
          PY,
        ),
        DenyRule::regex(r"\blogging\.warn\(", "use logging.warning()", PY),
        DenyRule::regex(r"\bdistutils\b", "use setuptools instead", PY),
        DenyRule::exact("__defineGetter__", "use Object.defineProperty()", JS),
        DenyRule::exact("__defineSetter__", "use Object.defineProperty()", JS),
        DenyRule::regex(r"\bunescape\(|\bescape\(", "use encodeURIComponent / decodeURIComponent", JS),
        DenyRule::regex(r"\bdocument\.write\(", "manipulate the DOM directly", JS),
        DenyRule::regex(r"\.substr\(", "use .substring() or .slice()", JS),
        DenyRule::regex(r"\bnew\s+Buffer\(", "use Buffer.from() or Buffer.alloc()", JS),
        DenyRule::regex(r"\bfs\.exists\(", "use fs.access() or fs.stat()", JS),
        DenyRule::regex(
          r"\bcomponentWill(?:Mount|ReceiveProps|Update)\b",
          "legacy React lifecycle method",
          JS,
        ),
        DenyRule::regex(r"\bReactDOM\.render\(", "use createRoot() (React 18)", JS),
        DenyRule::regex(r"\bnew\s+(?:Integer|Boolean|Long|Double)\(", "use valueOf()", JAVA),
        DenyRule::regex(r"\bThread\.(?:stop|suspend|resume)\(", "unsafe Thread control", JAVA),
        DenyRule::regex(r"\bioutil\.\w+", "use the io and os packages (Go 1.16)", GO),
        DenyRule::regex(r"\bstrings\.Title\(", "use golang.org/x/text/cases", GO),
        DenyRule::regex(r"@[Dd]eprecated\b", "annotated deprecated; review if still needed", &[]),
        DenyRule::exact("[[deprecated]]", "C++ deprecated attribute", &[]),
      ],
    }
  }
}

// ---------------------------------------------------------------------------
// Score
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeverityWeights {
  pub info: u32,
  pub warn: u32,
  pub fail: u32,
}

impl Default for SeverityWeights {
  fn default() -> Self {
    Self {
      info: 0,
      warn: 3,
      fail: 25,
    }
  }
}

/// Lower bound (inclusive) of each grade; anything below `d` is F.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GradeBoundaries {
  pub a: u8,
  pub b: u8,
  pub c: u8,
  pub d: u8,
}

impl Default for GradeBoundaries {
  fn default() -> Self {
    Self {
      a: 90,
      b: 75,
      c: 60,
      d: 40,
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreConfig {
  pub weights: SeverityWeights,
  /// Average complexity above which points are deducted.
  pub complexity_threshold: f64,
  /// Points per unit of average complexity above the threshold.
  pub complexity_penalty: f64,
  pub grades: GradeBoundaries,
  /// CI quality gate: minimum score to pass.
  pub gate_threshold: u8,
}

impl Default for ScoreConfig {
  fn default() -> Self {
    Self {
      weights: SeverityWeights::default(),
      complexity_threshold: 10.0,
      complexity_penalty: 2.0,
      grades: GradeBoundaries::default(),
      gate_threshold: 30,
    }
  }
}

// ---------------------------------------------------------------------------
// Trend
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendConfig {
  /// Max prior snapshots in the baseline window.
  pub lookback: usize,
  /// Optional age cut-off for the window, in days.
  pub lookback_days: Option<i64>,
  /// |current - baseline| below this is "flat".
  pub flat_epsilon: f64,
}

impl Default for TrendConfig {
  fn default() -> Self {
    Self {
      lookback: 10,
      lookback_days: None,
      flat_epsilon: 1.0,
    }
  }
}

// ---------------------------------------------------------------------------
// Review + history collaborators
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewConfig {
  pub timeout_ms: u64,
  /// HTTP endpoint of the review service; unset disables review.
  pub endpoint: Option<String>,
  /// Diff characters sent to the reviewer.
  pub max_diff_chars: usize,
}

impl ReviewConfig {
  pub fn timeout(&self) -> Duration {
    Duration::from_millis(self.timeout_ms)
  }
}

impl Default for ReviewConfig {
  fn default() -> Self {
    Self {
      timeout_ms: 20_000,
      endpoint: None,
      max_diff_chars: 15_000,
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
  /// Read-trend-append attempts after the first on a partition conflict.
  pub max_append_retries: u32,
}

impl Default for HistoryConfig {
  fn default() -> Self {
    Self {
      max_append_retries: 5,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults_validate() {
    Config::default().validate().unwrap();
  }

  #[test]
  fn partial_toml_overrides_only_named_values() {
    let config = Config::from_toml_str(
      r#"
      [score]
      gate_threshold = 50

      [score.weights]
      warn = 5

      [trend]
      flat_epsilon = 2.5
      "#,
    )
    .unwrap();
    assert_eq!(config.score.gate_threshold, 50);
    assert_eq!(config.score.weights.warn, 5);
    assert_eq!(config.score.weights.fail, 25);
    assert_eq!(config.trend.flat_epsilon, 2.5);
    assert_eq!(config.trend.lookback, 10);
    assert!(!config.integrity.secret_patterns.is_empty());
  }

  #[test]
  fn non_monotonic_grades_rejected() {
    let err = Config::from_toml_str(
      r#"
      [score.grades]
      a = 70
      b = 80
      "#,
    )
    .unwrap_err();
    assert!(err.to_string().contains("score.grades"));
  }

  #[test]
  fn deny_rules_default_to_exact() {
    let config = Config::from_toml_str(
      r#"
      [[deprecation.rules]]
      pattern = "oldApi("
      message = "use newApi()"
      "#,
    )
    .unwrap();
    assert_eq!(config.deprecation.rules.len(), 1);
    assert_eq!(config.deprecation.rules[0].kind, MatchKind::Exact);
    assert!(config.deprecation.rules[0].extensions.is_empty());
  }

  #[test]
  fn zero_flat_epsilon_rejected() {
    let err = Config::from_toml_str("[trend]\nflat_epsilon = 0.0\n").unwrap_err();
    assert!(err.to_string().contains("flat_epsilon"));
    assert!(Config::from_toml_str("[trend]\nflat_epsilon = -1.0\n").is_err());
    assert!(Config::from_toml_str("[trend]\nflat_epsilon = 0.1\n").is_ok());
  }

  #[test]
  fn zero_lookback_rejected() {
    let err = Config::from_toml_str("[trend]\nlookback = 0\n").unwrap_err();
    assert!(err.to_string().contains("lookback"));
  }
}

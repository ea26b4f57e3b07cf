//! Integrity validator: secret-like values and leftover debug / bypass code in
//! added lines, plus committed binary files.
//!
//! Redaction is a hard invariant: no finding message ever carries a matched
//! secret value. Every value any secret rule matched on a line is masked
//! before the line is used as an excerpt.

use std::collections::HashSet;

use regex::Regex;
use tracing::warn;

use crate::config::{IntegrityConfig, PatternRule};
use crate::diff::ParsedFile;
use crate::error::ConfigError;
use crate::types::{Category, Finding, IntegrityStatus, Severity};

const EXCERPT_CHARS: usize = 80;
const MASK: &str = "********";
/// Message prefix shared by every binary-file finding.
pub const BINARY_FINDING: &str = "binary file committed";

#[derive(Debug, Clone)]
struct CompiledRule {
  name: String,
  regex: Regex,
}

fn compile(rules: &[PatternRule], section: &str) -> Result<Vec<CompiledRule>, ConfigError> {
  rules
    .iter()
    .map(|r| {
      Regex::new(&r.pattern)
        .map(|regex| CompiledRule {
          name: r.name.clone(),
          regex,
        })
        .map_err(|source| ConfigError::Regex {
          rule: format!("{}.{}", section, r.name),
          source,
        })
    })
    .collect()
}

/// Compiled secret and debug pattern sets.
#[derive(Debug, Clone)]
pub struct IntegrityRules {
  secrets: Vec<CompiledRule>,
  debug: Vec<CompiledRule>,
  literal: Regex,
  entropy_threshold: f64,
  binary_extensions: HashSet<String>,
}

impl IntegrityRules {
  pub fn new(config: &IntegrityConfig) -> Result<Self, ConfigError> {
    let literal = Regex::new(&format!(
      r#"["']([A-Za-z0-9+/=_\-]{{{},}})["']"#,
      config.entropy_min_length.max(1)
    ))
    .map_err(|source| ConfigError::Regex {
      rule: "integrity.entropy_literal".into(),
      source,
    })?;
    Ok(Self {
      secrets: compile(&config.secret_patterns, "integrity.secret_patterns")?,
      debug: compile(&config.debug_patterns, "integrity.debug_patterns")?,
      literal,
      entropy_threshold: config.entropy_threshold,
      binary_extensions: config
        .binary_extensions
        .iter()
        .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
        .filter(|e| !e.is_empty())
        .collect(),
    })
  }

  /// Why `parsed` counts as a binary file, if it does.
  fn binary_reason(&self, parsed: &ParsedFile<'_>) -> Option<String> {
    if parsed.diff.binary {
      return Some("git reports a binary diff".into());
    }
    parsed
      .file
      .extension()
      .filter(|ext| self.binary_extensions.contains(ext))
      .map(|ext| format!("`.{}` extension", ext))
  }

  /// First secret rule that matched, plus every secret value on the line.
  fn scan_secrets(&self, line: &str) -> Option<(String, Vec<String>)> {
    let mut first: Option<&str> = None;
    let mut values = Vec::new();

    for rule in &self.secrets {
      for caps in rule.regex.captures_iter(line) {
        let Some(m) = caps.name("secret").or_else(|| caps.get(0)) else {
          continue;
        };
        let value = m.as_str();
        if value.is_empty() || is_reference(value) {
          continue;
        }
        first.get_or_insert(rule.name.as_str());
        values.push(value.to_string());
      }
    }

    for caps in self.literal.captures_iter(line) {
      if let Some(m) = caps.get(1) {
        if shannon_entropy(m.as_str()) >= self.entropy_threshold {
          first.get_or_insert("high-entropy literal");
          values.push(m.as_str().to_string());
        }
      }
    }

    first.map(|name| (name.to_string(), values))
  }

  fn scan_debug(&self, line: &str) -> Option<&str> {
    self
      .debug
      .iter()
      .find(|r| r.regex.is_match(line))
      .map(|r| r.name.as_str())
  }
}

/// Integrity verdict for one change set.
#[derive(Debug, Clone, PartialEq)]
pub struct IntegrityReport {
  pub status: IntegrityStatus,
  pub findings: Vec<Finding>,
  pub files_scanned: usize,
  /// blake3 over the sorted (path, diff) pairs.
  pub content_hash: String,
}

/// Scan every added line of every file (ignored files included).
pub fn validate(files: &[ParsedFile<'_>], rules: &IntegrityRules) -> IntegrityReport {
  let mut findings = Vec::new();
  let mut secrets = 0usize;
  let mut debug = 0usize;
  let mut binaries = 0usize;

  for parsed in files {
    let path = parsed.file.path.as_str();
    if let Some(reason) = rules.binary_reason(parsed) {
      binaries += 1;
      findings.push(Finding::new(
        Category::Style,
        Severity::Warn,
        path,
        None,
        format!("{} ({}); keep binaries out of the repository", BINARY_FINDING, reason),
      ));
    }
    for added in &parsed.diff.added {
      let secret = rules.scan_secrets(&added.text);
      let excerpt = match &secret {
        Some((_, values)) => excerpt(&redact_line(&added.text, values)),
        None => excerpt(&added.text),
      };

      if let Some((rule, _)) = &secret {
        secrets += 1;
        findings.push(Finding::new(
          Category::Secret,
          Severity::Fail,
          path,
          Some(added.line),
          format!("possible {} committed: `{}`", rule, excerpt),
        ));
      }
      if let Some(rule) = rules.scan_debug(&added.text) {
        debug += 1;
        findings.push(Finding::new(
          Category::DebugStatement,
          Severity::Warn,
          path,
          Some(added.line),
          format!("{} left in code: `{}`", rule, excerpt),
        ));
      }
    }
  }

  let status = if secrets > 0 {
    IntegrityStatus::Fail
  } else if debug > 0 || binaries > 0 {
    IntegrityStatus::Warn
  } else {
    IntegrityStatus::Pass
  };
  if secrets > 0 {
    warn!(secrets, "secret-like values found in added lines");
  }

  IntegrityReport {
    status,
    findings,
    files_scanned: files.len(),
    content_hash: content_hash(files),
  }
}

/// Whether `finding` is a binary-file finding raised by `validate`.
pub fn is_binary_finding(finding: &Finding) -> bool {
  finding.category == Category::Style && finding.message.starts_with(BINARY_FINDING)
}

/// Mask a secret value: two leading chars for long values, nothing otherwise.
pub fn mask(value: &str) -> String {
  if value.chars().count() >= 8 {
    let head: String = value.chars().take(2).collect();
    format!("{}{}", head, MASK)
  } else {
    MASK.to_string()
  }
}

/// Replace every occurrence of every value, longest first.
pub fn redact_line(line: &str, values: &[String]) -> String {
  let mut sorted: Vec<&String> = values.iter().collect();
  sorted.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
  sorted.dedup();
  let mut out = line.to_string();
  for value in sorted {
    out = out.replace(value.as_str(), &mask(value));
  }
  out
}

fn excerpt(line: &str) -> String {
  let trimmed = line.trim();
  if trimmed.chars().count() <= EXCERPT_CHARS {
    trimmed.to_string()
  } else {
    let mut s: String = trimmed.chars().take(EXCERPT_CHARS).collect();
    s.push('…');
    s
  }
}

/// Shannon entropy in bits per character.
pub fn shannon_entropy(s: &str) -> f64 {
  let mut counts = std::collections::HashMap::new();
  let mut total = 0usize;
  for ch in s.chars() {
    *counts.entry(ch).or_insert(0usize) += 1;
    total += 1;
  }
  if total == 0 {
    return 0.0;
  }
  counts
    .values()
    .map(|&c| {
      let p = c as f64 / total as f64;
      -p * p.log2()
    })
    .sum()
}

/// Values that name a secret instead of containing one.
fn is_reference(value: &str) -> bool {
  const MARKERS: [&str; 9] = [
    "process.env",
    "os.environ",
    "getenv",
    "example",
    "placeholder",
    "changeme",
    "your_",
    "your-",
    "xxxx",
  ];
  let lower = value.to_ascii_lowercase();
  if MARKERS.iter().any(|m| lower.contains(m)) {
    return true;
  }
  // config.api_key, self.token, settings.SECRET_KEY
  let parts: Vec<&str> = value.split('.').collect();
  parts.len() >= 2
    && parts.iter().all(|p| {
      p.len() <= 40
        && p.chars().next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && p.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    })
}

fn content_hash(files: &[ParsedFile<'_>]) -> String {
  let mut sorted: Vec<_> = files.iter().map(|p| p.file).collect();
  sorted.sort_by(|a, b| a.path.cmp(&b.path));
  let mut hasher = blake3::Hasher::new();
  for file in sorted {
    hasher.update(file.path.as_bytes());
    hasher.update(b"\0");
    hasher.update(file.diff.as_bytes());
    hasher.update(b"\n");
  }
  hasher.finalize().to_hex().to_string()
}

//! Deprecation detector: a pure matcher of a configured deny-list over added
//! lines. One finding per line (first matching rule).

use regex::Regex;

use crate::config::{DenyRule, DeprecationConfig, MatchKind};
use crate::diff::{AddedLine, ParsedFile};
use crate::error::ConfigError;
use crate::types::{Category, Finding, Severity};

#[derive(Debug, Clone)]
enum Matcher {
  Exact(String),
  Regex(Regex),
}

impl Matcher {
  fn is_match(&self, line: &str) -> bool {
    match self {
      Self::Exact(s) => line.contains(s.as_str()),
      Self::Regex(r) => r.is_match(line),
    }
  }
}

#[derive(Debug, Clone)]
struct CompiledDeny {
  pattern: String,
  matcher: Matcher,
  message: String,
  extensions: Vec<String>,
}

impl CompiledDeny {
  fn applies_to(&self, ext: Option<&str>) -> bool {
    self.extensions.is_empty()
      || ext.is_some_and(|e| self.extensions.iter().any(|x| x.eq_ignore_ascii_case(e)))
  }
}

/// Compiled deny-list.
#[derive(Debug, Clone, Default)]
pub struct DenyList {
  rules: Vec<CompiledDeny>,
}

impl DenyList {
  pub fn new(config: &DeprecationConfig) -> Result<Self, ConfigError> {
    let rules = config
      .rules
      .iter()
      .enumerate()
      .map(|(i, r)| compile(i, r))
      .collect::<Result<Vec<_>, _>>()?;
    Ok(Self { rules })
  }

  pub fn len(&self) -> usize {
    self.rules.len()
  }

  pub fn is_empty(&self) -> bool {
    self.rules.is_empty()
  }

  /// Match lines of one file against the deny-list.
  pub fn scan_lines<'a>(
    &self,
    path: &str,
    ext: Option<&str>,
    lines: impl IntoIterator<Item = &'a AddedLine>,
  ) -> Vec<Finding> {
    let applicable: Vec<&CompiledDeny> = self.rules.iter().filter(|r| r.applies_to(ext)).collect();
    if applicable.is_empty() {
      return Vec::new();
    }
    lines
      .into_iter()
      .filter_map(|added| {
        let rule = applicable.iter().find(|r| r.matcher.is_match(&added.text))?;
        let mut label: String = rule.pattern.chars().take(50).collect();
        if rule.pattern.chars().count() > 50 {
          label.push('…');
        }
        let message = if rule.message.is_empty() {
          format!("deprecated usage matches deny-list entry `{}`", label)
        } else {
          format!("deprecated usage matches `{}`: {}", label, rule.message)
        };
        Some(Finding::new(
          Category::DeprecatedSymbol,
          Severity::Warn,
          path,
          Some(added.line),
          message,
        ))
      })
      .collect()
  }
}

fn compile(index: usize, rule: &DenyRule) -> Result<CompiledDeny, ConfigError> {
  if rule.pattern.is_empty() {
    return Err(ConfigError::invalid(format!(
      "deprecation.rules[{}]: pattern must not be empty",
      index
    )));
  }
  let matcher = match rule.kind {
    MatchKind::Exact => Matcher::Exact(rule.pattern.clone()),
    MatchKind::Regex => Matcher::Regex(Regex::new(&rule.pattern).map_err(|source| {
      ConfigError::Regex {
        rule: format!("deprecation.rules[{}]", index),
        source,
      }
    })?),
  };
  Ok(CompiledDeny {
    pattern: rule.pattern.clone(),
    matcher,
    message: rule.message.clone(),
    extensions: rule
      .extensions
      .iter()
      .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
      .collect(),
  })
}

/// Scan every non-ignored file.
pub fn detect(files: &[ParsedFile<'_>], deny: &DenyList) -> Vec<Finding> {
  files
    .iter()
    .filter(|p| !p.ignored)
    .flat_map(|p| {
      let ext = p.file.extension();
      deny.scan_lines(&p.file.path, ext.as_deref(), &p.diff.added)
    })
    .collect()
}

//! Structured error types for the quality engine.
//!
//! Only `EngineError` ever reaches the caller of `analyze`. History and review
//! failures are collaborator errors that the engine degrades into markers on
//! the result.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
  #[error("invalid payload: {field}: {reason}")]
  InvalidPayload { field: String, reason: String },
}

impl EngineError {
  pub fn invalid(field: &str, reason: &str) -> Self {
    Self::InvalidPayload {
      field: field.to_string(),
      reason: reason.to_string(),
    }
  }

  /// Field name that failed validation.
  pub fn field(&self) -> &str {
    match self {
      Self::InvalidPayload { field, .. } => field,
    }
  }
}

/// Raised while building an engine from configuration, never per request.
#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("config io: {0}")]
  Io(#[from] std::io::Error),

  #[error("config toml: {0}")]
  Toml(#[from] toml::de::Error),

  #[error("invalid regex in {rule}: {source}")]
  Regex {
    rule: String,
    #[source]
    source: regex::Error,
  },

  #[error("invalid glob {pattern}: {source}")]
  Glob {
    pattern: String,
    #[source]
    source: glob::PatternError,
  },

  #[error("invalid config: {0}")]
  Invalid(String),
}

impl ConfigError {
  pub fn invalid(msg: impl Into<String>) -> Self {
    Self::Invalid(msg.into())
  }
}

#[derive(Debug, Error)]
pub enum HistoryError {
  #[error("history unavailable: {0}")]
  Unavailable(String),

  #[error("history conflict on {repository}@{branch}: partition head moved")]
  Conflict { repository: String, branch: String },

  #[error("history io: {0}")]
  Io(#[from] std::io::Error),

  #[error("history json: {0}")]
  Json(#[from] serde_json::Error),
}

pub type HistoryResult<T> = std::result::Result<T, HistoryError>;

#[derive(Debug, Error)]
pub enum ReviewError {
  #[error("review unavailable: {0}")]
  Unavailable(String),

  #[error("review timed out after {0:?}")]
  Timeout(Duration),

  #[error("review http: {0}")]
  Http(#[from] reqwest::Error),
}

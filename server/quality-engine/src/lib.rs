//! PushLog Push Quality Engine: deterministic analysis of one push.
//!
//! Validates a push payload, scans added lines for complexity, leaked
//! secrets, debug leftovers and deprecated APIs, scores the change, compares
//! the score with the branch's history and renders a Markdown report.
//!
//! Pure computation except for two collaborators behind traits: the
//! snapshot history (`HistoryStore`) and the optional external reviewer
//! (`Reviewer`).

pub mod analyzer;
pub mod config;
pub mod deprecation;
pub mod developer;
pub mod diff;
pub mod engine;
pub mod error;
pub mod fakes;
pub mod history;
pub mod ingest;
pub mod integrity;
pub mod report;
pub mod review;
pub mod score;
pub mod trend;
pub mod types;

pub use config::Config;
pub use engine::Engine;
pub use error::{ConfigError, EngineError, HistoryError, ReviewError};
pub use history::{
  open_or_unavailable, FileHistoryStore, HistoryStore, MemoryHistoryStore, UnavailableHistoryStore,
};
pub use report::Report;
pub use review::{DisabledReviewer, HttpReviewer, Reviewer};
pub use types::{AnalysisResult, InboundPush};

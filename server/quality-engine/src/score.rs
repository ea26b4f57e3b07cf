//! Quality score, letter grade, and CI gate verdict.
//!
//! Pure: identical findings and metrics always give identical output. The
//! trend never feeds back into the score.

use crate::config::{GradeBoundaries, ScoreConfig};
use crate::types::{Finding, Grade, IntegrityStatus, ScoreBreakdown, Severity};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreOutcome {
  pub score: u8,
  pub grade: Grade,
  pub gate_passed: bool,
  pub breakdown: ScoreBreakdown,
}

/// Score 0–100: start at 100, subtract per-finding weights and the complexity
/// penalty, clamp.
pub fn compute(
  findings: &[Finding],
  avg_complexity: f64,
  integrity: IntegrityStatus,
  config: &ScoreConfig,
) -> ScoreOutcome {
  let mut breakdown = ScoreBreakdown::default();
  let mut findings_penalty: u64 = 0;
  for f in findings {
    let weight = match f.severity {
      Severity::Info => {
        breakdown.info_findings += 1;
        config.weights.info
      }
      Severity::Warn => {
        breakdown.warn_findings += 1;
        config.weights.warn
      }
      Severity::Fail => {
        breakdown.fail_findings += 1;
        config.weights.fail
      }
    };
    findings_penalty += weight as u64;
  }
  let complexity = complexity_penalty(avg_complexity, config);

  breakdown.findings_penalty = findings_penalty.min(u32::MAX as u64) as u32;
  breakdown.complexity_penalty = complexity;

  let total = findings_penalty + complexity as u64;
  let score = (100 - total.min(100)) as u8;
  let grade = grade(score, &config.grades);
  let gate_passed = score >= config.gate_threshold && integrity != IntegrityStatus::Fail;

  ScoreOutcome {
    score,
    grade,
    gate_passed,
    breakdown,
  }
}

/// Points lost for average complexity above the threshold.
pub fn complexity_penalty(avg_complexity: f64, config: &ScoreConfig) -> u32 {
  let excess = avg_complexity - config.complexity_threshold;
  if !(excess > 0.0) {
    return 0;
  }
  let penalty = (excess * config.complexity_penalty).round();
  if penalty >= 100.0 {
    100
  } else {
    penalty as u32
  }
}

/// Letter grade from inclusive lower bounds; anything below `d` is F.
pub fn grade(score: u8, grades: &GradeBoundaries) -> Grade {
  if score >= grades.a {
    Grade::A
  } else if score >= grades.b {
    Grade::B
  } else if score >= grades.c {
    Grade::C
  } else if score >= grades.d {
    Grade::D
  } else {
    Grade::F
  }
}

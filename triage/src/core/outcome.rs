//! Per-stage execution outcomes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// How a single stage execution ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// The stage ran and its fields were merged.
    Succeeded,
    /// The stage was not applicable to this sample.
    Skipped {
        /// Why the stage did not apply.
        reason: String,
    },
    /// The stage returned an error; its output was discarded.
    Failed {
        /// The stage error, kind and message.
        error: String,
    },
    /// The stage exceeded its time budget; partial output was discarded.
    TimedOut,
}

impl OutcomeStatus {
    /// Returns true for outcomes that merged fields.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }

    /// Returns true for failed or timed-out outcomes.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. } | Self::TimedOut)
    }

    /// Short status label.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Skipped { .. } => "skipped",
            Self::Failed { .. } => "failed",
            Self::TimedOut => "timed_out",
        }
    }
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Record of one stage execution, appended to the task log and never rewritten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageOutcome {
    /// The stage name.
    pub stage: String,
    /// How the execution ended.
    #[serde(flatten)]
    pub status: OutcomeStatus,
    /// Elapsed wall time in milliseconds.
    pub elapsed_ms: f64,
}

impl StageOutcome {
    /// Creates a succeeded outcome.
    #[must_use]
    pub fn succeeded(stage: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            stage: stage.into(),
            status: OutcomeStatus::Succeeded,
            elapsed_ms: elapsed.as_secs_f64() * 1000.0,
        }
    }

    /// Creates a skipped (not-applicable) outcome.
    #[must_use]
    pub fn skipped(stage: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            status: OutcomeStatus::Skipped {
                reason: reason.into(),
            },
            elapsed_ms: 0.0,
        }
    }

    /// Creates a failed outcome carrying the error text.
    #[must_use]
    pub fn failed(stage: impl Into<String>, error: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            stage: stage.into(),
            status: OutcomeStatus::Failed {
                error: error.into(),
            },
            elapsed_ms: elapsed.as_secs_f64() * 1000.0,
        }
    }

    /// Creates a timed-out outcome.
    #[must_use]
    pub fn timed_out(stage: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            stage: stage.into(),
            status: OutcomeStatus::TimedOut,
            elapsed_ms: elapsed.as_secs_f64() * 1000.0,
        }
    }
}

//! Task identity, lifecycle state and terminal failure causes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::outcome::StageOutcome;
use super::sample::SampleHandle;

/// Unique identifier of one sample-analysis task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    /// Generates a fresh random identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wraps an existing UUID.
    #[must_use]
    pub const fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The lifecycle state of a task.
///
/// Legal transitions form a total order: `pending -> running -> (completed | failed)`.
/// Two extra edges exist outside normal processing: `running -> pending` is the
/// crash-recovery reset, and `pending -> failed` marks a task whose sample never
/// materialized (it never ran, so no `running` record is fabricated).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Queued and waiting for a worker slot.
    Pending,
    /// Owned by exactly one worker.
    Running,
    /// Terminal: processed, report attached.
    Completed,
    /// Terminal: failed with an inspectable cause.
    Failed,
}

impl TaskState {
    /// Returns true if the state is terminal.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Returns true if moving to `next` is a legal transition.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Failed)
                | (Self::Running, Self::Pending)
                | (Self::Pending, Self::Failed)
        )
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Why a task ended in the `failed` state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureCause {
    /// Every analysis stage that executed failed; no report could be produced.
    AllStagesFailed,
    /// The sample content was never available after bounded requeue attempts.
    MissingSample {
        /// How many admission attempts were made before giving up.
        attempts: u32,
    },
    /// Terminal persistence kept failing after bounded retries.
    Persistence {
        /// The last store error observed.
        message: String,
    },
    /// The task was cancelled by request between stages.
    Cancelled {
        /// The reason supplied with the cancellation.
        reason: String,
    },
    /// A registry misconfiguration surfaced while processing (e.g. two stages
    /// producing the same field key).
    Configuration {
        /// Description of the misconfiguration.
        message: String,
    },
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AllStagesFailed => write!(f, "all analysis stages failed"),
            Self::MissingSample { attempts } => {
                write!(f, "sample missing after {attempts} attempts")
            }
            Self::Persistence { message } => write!(f, "persistence error: {message}"),
            Self::Cancelled { reason } => write!(f, "cancelled: {reason}"),
            Self::Configuration { message } => write!(f, "configuration error: {message}"),
        }
    }
}

/// One sample-analysis request and its lifecycle record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique task identifier.
    pub id: TaskId,
    /// Content address of the submitted sample.
    pub sample: SampleHandle,
    /// When the task was submitted.
    pub submitted_at: DateTime<Utc>,
    /// Current lifecycle state.
    pub state: TaskState,
    /// Ordered, append-only log of per-stage outcomes.
    pub stage_log: Vec<StageOutcome>,
    /// Terminal failure cause, set at most once.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureCause>,
    /// How many times admission skipped this task for a missing sample.
    #[serde(default)]
    pub requeue_attempts: u32,
}

impl Task {
    /// Creates a new pending task for a sample.
    #[must_use]
    pub fn new(sample: SampleHandle) -> Self {
        Self::with_id(TaskId::new(), sample)
    }

    /// Creates a new pending task with an explicit identifier.
    #[must_use]
    pub fn with_id(id: TaskId, sample: SampleHandle) -> Self {
        Self {
            id,
            sample,
            submitted_at: Utc::now(),
            state: TaskState::Pending,
            stage_log: Vec::new(),
            failure: None,
            requeue_attempts: 0,
        }
    }

    /// Returns true if the task has reached a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

//! Error taxonomy for the triage core.
//!
//! Configuration-time errors (`DuplicateStageError`, `DuplicateTaskError`,
//! `KeyCollisionError`) are surfaced to the caller; per-stage errors are
//! recovered into the stage log and never abort sibling stages; pipeline and
//! store errors become the task's terminal failure cause.

use thiserror::Error;

use crate::core::{SampleHandle, TaskId};

/// A stage name was registered twice. Fatal at startup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("duplicate stage registered: '{name}'")]
pub struct DuplicateStageError {
    /// The already-registered stage name.
    pub name: String,
}

impl DuplicateStageError {
    /// Creates a new duplicate stage error.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// A task identifier was submitted while still unresolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("duplicate task submitted: {id}")]
pub struct DuplicateTaskError {
    /// The conflicting task id.
    pub id: TaskId,
}

/// Two stages produced the same field key.
///
/// This is a registry configuration bug; it is surfaced instead of silently
/// overwriting the earlier stage's data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("field key collision: stage '{stage}' rewrote '{key}'")]
pub struct KeyCollisionError {
    /// The stage whose merge collided.
    pub stage: String,
    /// The colliding field key.
    pub key: String,
}

impl KeyCollisionError {
    /// Creates a new key collision error.
    #[must_use]
    pub fn new(stage: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            key: key.into(),
        }
    }
}

/// An error raised inside a stage, recorded as a `failed` outcome.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct StageError {
    /// Machine-readable error kind (e.g. `malformed_header`).
    pub kind: String,
    /// Human-readable message.
    pub message: String,
}

impl StageError {
    /// Creates a new stage error.
    #[must_use]
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

/// Pipeline-level errors: the whole task fails with these.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    /// At least one analysis stage executed and none succeeded.
    #[error("all analysis stages failed")]
    AllStagesFailed,

    /// The task was cancelled between stages.
    #[error("task cancelled: {reason}")]
    Cancelled {
        /// The cancellation reason.
        reason: String,
    },

    /// A field key collision surfaced while merging stage output.
    #[error("{0}")]
    KeyCollision(#[from] KeyCollisionError),
}

/// Errors from the task store adapter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The task identifier is already known and unresolved.
    #[error("{0}")]
    Duplicate(#[from] DuplicateTaskError),

    /// No task record exists for the identifier.
    #[error("task not found: {id}")]
    NotFound {
        /// The missing task id.
        id: TaskId,
    },

    /// The store is temporarily unreachable; dispatch pauses, running tasks
    /// keep executing.
    #[error("store unavailable: {message}")]
    Unavailable {
        /// The underlying error.
        message: String,
    },
}

/// Errors from the sample content store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SampleStoreError {
    /// No content is stored under the handle.
    #[error("sample not found: {handle}")]
    NotFound {
        /// The missing content address.
        handle: SampleHandle,
    },

    /// The sample store is temporarily unreachable.
    #[error("sample store unavailable: {message}")]
    Unavailable {
        /// The underlying error.
        message: String,
    },
}

/// Crate-level error type folding the taxonomy together.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TriageError {
    /// Duplicate stage registration.
    #[error("{0}")]
    DuplicateStage(#[from] DuplicateStageError),

    /// Duplicate task submission.
    #[error("{0}")]
    DuplicateTask(#[from] DuplicateTaskError),

    /// Field key collision.
    #[error("{0}")]
    KeyCollision(#[from] KeyCollisionError),

    /// Pipeline-level failure.
    #[error("{0}")]
    Pipeline(#[from] PipelineError),

    /// Task store failure.
    #[error("{0}")]
    Store(#[from] StoreError),

    /// Sample store failure.
    #[error("{0}")]
    SampleStore(#[from] SampleStoreError),
}

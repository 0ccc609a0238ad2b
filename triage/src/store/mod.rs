//! Persistence seams: task records and sample content.
//!
//! The scheduler and driver only ever talk to these traits; the in-memory
//! adapters back the test suite and single-process deployments, and a durable
//! backend can be swapped in without touching the scheduling logic.

mod memory;

pub use memory::{InMemorySampleStore, InMemoryTaskStore};

use async_trait::async_trait;
use std::sync::Arc;

use crate::core::{Report, SampleHandle, StageOutcome, Task, TaskId, TaskState};
use crate::errors::{SampleStoreError, StoreError};

/// Adapter over the task record store.
///
/// Implementations must make `compare_and_set_state` atomic per task: exactly
/// one of several concurrent callers observing the same expected state wins.
/// Everything else builds on that primitive.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Inserts a new pending task record.
    ///
    /// # Errors
    ///
    /// `StoreError::Duplicate` if the identifier is already known and the
    /// existing record is not terminal.
    async fn create(&self, task: Task) -> Result<(), StoreError>;

    /// Loads one task record.
    async fn load(&self, id: TaskId) -> Result<Option<Task>, StoreError>;

    /// Lists pending tasks in admission order: oldest submission first,
    /// identifier as the tiebreaker.
    async fn list_pending(&self) -> Result<Vec<Task>, StoreError>;

    /// Lists tasks currently marked running.
    async fn list_running(&self) -> Result<Vec<Task>, StoreError>;

    /// Atomically moves a task from `expected` to `next`.
    ///
    /// Returns `true` if this caller won the transition, `false` if the
    /// record was not in `expected` (someone else got there first, or the
    /// transition is illegal).
    async fn compare_and_set_state(
        &self,
        id: TaskId,
        expected: TaskState,
        next: TaskState,
    ) -> Result<bool, StoreError>;

    /// Appends one outcome to the task's stage log.
    async fn append_stage_outcome(
        &self,
        id: TaskId,
        outcome: StageOutcome,
    ) -> Result<(), StoreError>;

    /// Stores the finalized report for a task.
    async fn attach_report(&self, report: Report) -> Result<(), StoreError>;

    /// Records the terminal failure cause.
    async fn set_failure(
        &self,
        id: TaskId,
        cause: crate::core::FailureCause,
    ) -> Result<(), StoreError>;

    /// Bumps and returns the missing-sample requeue counter.
    async fn increment_requeue(&self, id: TaskId) -> Result<u32, StoreError>;

    /// Fetches the report attached to a task, if any.
    async fn report(&self, id: TaskId) -> Result<Option<Report>, StoreError>;

    /// Crash-recovery reset: atomically moves a running task back to pending
    /// and clears its stage log and failure so reprocessing starts fresh.
    ///
    /// Returns `false` if the task was not running.
    async fn reset(&self, id: TaskId) -> Result<bool, StoreError>;
}

/// Adapter over content-addressed sample storage.
#[async_trait]
pub trait SampleStore: Send + Sync {
    /// Fetches the sample bytes for a handle.
    ///
    /// # Errors
    ///
    /// `SampleStoreError::NotFound` if nothing is stored under the handle.
    async fn fetch(&self, handle: &SampleHandle) -> Result<Arc<Vec<u8>>, SampleStoreError>;

    /// Returns true if content exists for the handle.
    async fn contains(&self, handle: &SampleHandle) -> bool;
}

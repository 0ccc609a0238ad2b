//! In-memory store adapters backed by `DashMap`.
//!
//! `DashMap` locks per shard, so holding an entry reference across a
//! read-modify-write makes `compare_and_set_state` atomic per task.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

use super::{SampleStore, TaskStore};
use crate::core::{FailureCause, Report, SampleHandle, StageOutcome, Task, TaskId, TaskState};
use crate::errors::{DuplicateTaskError, SampleStoreError, StoreError};

/// Task record store holding everything in process memory.
#[derive(Debug, Default)]
pub struct InMemoryTaskStore {
    tasks: DashMap<TaskId, Task>,
    reports: DashMap<TaskId, Report>,
}

impl InMemoryTaskStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of task records held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Returns true if no task records are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn create(&self, task: Task) -> Result<(), StoreError> {
        match self.tasks.entry(task.id) {
            dashmap::mapref::entry::Entry::Occupied(mut existing) => {
                if existing.get().is_terminal() {
                    let id = task.id;
                    existing.insert(task);
                    drop(existing);
                    self.reports.remove(&id);
                    Ok(())
                } else {
                    Err(DuplicateTaskError { id: task.id }.into())
                }
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(task);
                Ok(())
            }
        }
    }

    async fn load(&self, id: TaskId) -> Result<Option<Task>, StoreError> {
        Ok(self.tasks.get(&id).map(|entry| entry.clone()))
    }

    async fn list_pending(&self) -> Result<Vec<Task>, StoreError> {
        let mut pending: Vec<Task> = self
            .tasks
            .iter()
            .filter(|entry| entry.state == TaskState::Pending)
            .map(|entry| entry.clone())
            .collect();
        pending.sort_by_key(|task| (task.submitted_at, task.id));
        Ok(pending)
    }

    async fn list_running(&self) -> Result<Vec<Task>, StoreError> {
        Ok(self
            .tasks
            .iter()
            .filter(|entry| entry.state == TaskState::Running)
            .map(|entry| entry.clone())
            .collect())
    }

    async fn compare_and_set_state(
        &self,
        id: TaskId,
        expected: TaskState,
        next: TaskState,
    ) -> Result<bool, StoreError> {
        let Some(mut entry) = self.tasks.get_mut(&id) else {
            return Err(StoreError::NotFound { id });
        };
        if entry.state != expected || !expected.can_transition_to(next) {
            return Ok(false);
        }
        entry.state = next;
        Ok(true)
    }

    async fn append_stage_outcome(
        &self,
        id: TaskId,
        outcome: StageOutcome,
    ) -> Result<(), StoreError> {
        let Some(mut entry) = self.tasks.get_mut(&id) else {
            return Err(StoreError::NotFound { id });
        };
        entry.stage_log.push(outcome);
        Ok(())
    }

    async fn attach_report(&self, report: Report) -> Result<(), StoreError> {
        let id = report.task_id;
        if !self.tasks.contains_key(&id) {
            return Err(StoreError::NotFound { id });
        }
        self.reports.insert(id, report);
        Ok(())
    }

    async fn set_failure(&self, id: TaskId, cause: FailureCause) -> Result<(), StoreError> {
        let Some(mut entry) = self.tasks.get_mut(&id) else {
            return Err(StoreError::NotFound { id });
        };
        entry.failure = Some(cause);
        Ok(())
    }

    async fn increment_requeue(&self, id: TaskId) -> Result<u32, StoreError> {
        let Some(mut entry) = self.tasks.get_mut(&id) else {
            return Err(StoreError::NotFound { id });
        };
        entry.requeue_attempts += 1;
        Ok(entry.requeue_attempts)
    }

    async fn report(&self, id: TaskId) -> Result<Option<Report>, StoreError> {
        Ok(self.reports.get(&id).map(|entry| entry.clone()))
    }

    async fn reset(&self, id: TaskId) -> Result<bool, StoreError> {
        let Some(mut entry) = self.tasks.get_mut(&id) else {
            return Err(StoreError::NotFound { id });
        };
        if entry.state != TaskState::Running {
            return Ok(false);
        }
        entry.state = TaskState::Pending;
        entry.stage_log.clear();
        entry.failure = None;
        drop(entry);
        self.reports.remove(&id);
        Ok(true)
    }
}

/// Content-addressed in-memory sample store.
#[derive(Debug, Default)]
pub struct InMemorySampleStore {
    samples: DashMap<SampleHandle, Arc<Vec<u8>>>,
}

impl InMemorySampleStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores sample content and returns its handle.
    pub fn store(&self, bytes: &[u8]) -> SampleHandle {
        let handle = SampleHandle::from_bytes(bytes);
        self.samples
            .insert(handle.clone(), Arc::new(bytes.to_vec()));
        handle
    }

    /// Drops stored content, for exercising missing-sample paths.
    pub fn remove(&self, handle: &SampleHandle) {
        self.samples.remove(handle);
    }
}

#[async_trait]
impl SampleStore for InMemorySampleStore {
    async fn fetch(&self, handle: &SampleHandle) -> Result<Arc<Vec<u8>>, SampleStoreError> {
        self.samples
            .get(handle)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| SampleStoreError::NotFound {
                handle: handle.clone(),
            })
    }

    async fn contains(&self, handle: &SampleHandle) -> bool {
        self.samples.contains_key(handle)
    }
}

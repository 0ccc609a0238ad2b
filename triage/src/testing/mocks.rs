//! Scripted stage and store doubles for exercising the pipeline.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::core::{FailureCause, Report, StageData, StageOutcome, Task, TaskId, TaskState};
use crate::errors::{StageError, StoreError};
use crate::stages::{Stage, StageContext};
use crate::store::{InMemoryTaskStore, TaskStore};

/// A stage that always succeeds with a fixed field map.
#[derive(Debug, Clone)]
pub struct StaticStage {
    data: StageData,
}

impl StaticStage {
    /// Creates a stage returning the given fields.
    #[must_use]
    pub fn new(data: StageData) -> Self {
        Self { data }
    }

    /// Creates a stage returning a single field.
    #[must_use]
    pub fn single(key: impl Into<String>, value: serde_json::Value) -> Self {
        let mut data = StageData::new();
        data.insert(key.into(), value);
        Self::new(data)
    }
}

#[async_trait]
impl Stage for StaticStage {
    async fn execute(&self, _ctx: &StageContext) -> Result<StageData, StageError> {
        Ok(self.data.clone())
    }
}

/// A stage that always fails with a fixed error.
#[derive(Debug, Clone)]
pub struct FailingStage {
    kind: String,
    message: String,
}

impl FailingStage {
    /// Creates a stage failing with the given kind and message.
    #[must_use]
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

#[async_trait]
impl Stage for FailingStage {
    async fn execute(&self, _ctx: &StageContext) -> Result<StageData, StageError> {
        Err(StageError::new(self.kind.clone(), self.message.clone()))
    }
}

/// A stage that sleeps before returning, for timeout and concurrency tests.
#[derive(Debug, Clone)]
pub struct SleepStage {
    delay: Duration,
    data: StageData,
}

impl SleepStage {
    /// Creates a stage sleeping `delay` before returning `data`.
    #[must_use]
    pub fn new(delay: Duration, data: StageData) -> Self {
        Self { delay, data }
    }
}

#[async_trait]
impl Stage for SleepStage {
    async fn execute(&self, _ctx: &StageContext) -> Result<StageData, StageError> {
        tokio::time::sleep(self.delay).await;
        Ok(self.data.clone())
    }
}

/// A stage that records how many invocations overlap in time.
///
/// Shared across tasks, it measures the scheduler's effective concurrency.
#[derive(Debug, Default)]
pub struct GaugeStage {
    current: AtomicUsize,
    peak: AtomicUsize,
    hold: Duration,
}

impl GaugeStage {
    /// Creates a gauge holding each invocation open for `hold`.
    #[must_use]
    pub fn new(hold: Duration) -> Self {
        Self {
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            hold,
        }
    }

    /// The highest overlap observed so far.
    #[must_use]
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Stage for GaugeStage {
    async fn execute(&self, _ctx: &StageContext) -> Result<StageData, StageError> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.hold).await;
        self.current.fetch_sub(1, Ordering::SeqCst);

        let mut data = StageData::new();
        data.insert("gauge.observed".to_string(), serde_json::json!(now));
        Ok(data)
    }
}

/// Task store wrapper with scripted outages.
///
/// Write outages fail the next N state/report/failure writes with
/// `StoreError::Unavailable`, exercising persistence retry. Pending-list
/// outages fail the next N `list_pending` calls, exercising dispatch
/// backpressure. Everything else passes through.
#[derive(Debug, Default)]
pub struct FlakyTaskStore {
    inner: InMemoryTaskStore,
    remaining_write_failures: AtomicUsize,
    remaining_pending_failures: AtomicUsize,
}

impl FlakyTaskStore {
    /// Creates a store with no scripted failures.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts the next `n` write operations to fail.
    pub fn fail_next(&self, n: usize) {
        self.remaining_write_failures.store(n, Ordering::SeqCst);
    }

    /// Scripts the next `n` pending-list reads to fail.
    pub fn fail_pending_next(&self, n: usize) {
        self.remaining_pending_failures.store(n, Ordering::SeqCst);
    }

    fn check(counter: &AtomicUsize) -> Result<(), StoreError> {
        let remaining = counter.load(Ordering::SeqCst);
        if remaining > 0
            && counter
                .compare_exchange(remaining, remaining - 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
        {
            return Err(StoreError::Unavailable {
                message: "scripted failure".to_string(),
            });
        }
        Ok(())
    }

    fn check_write(&self) -> Result<(), StoreError> {
        Self::check(&self.remaining_write_failures)
    }

    fn check_pending_read(&self) -> Result<(), StoreError> {
        Self::check(&self.remaining_pending_failures)
    }
}

#[async_trait]
impl TaskStore for FlakyTaskStore {
    async fn create(&self, task: Task) -> Result<(), StoreError> {
        self.inner.create(task).await
    }

    async fn load(&self, id: TaskId) -> Result<Option<Task>, StoreError> {
        self.inner.load(id).await
    }

    async fn list_pending(&self) -> Result<Vec<Task>, StoreError> {
        self.check_pending_read()?;
        self.inner.list_pending().await
    }

    async fn list_running(&self) -> Result<Vec<Task>, StoreError> {
        self.inner.list_running().await
    }

    async fn compare_and_set_state(
        &self,
        id: TaskId,
        expected: TaskState,
        next: TaskState,
    ) -> Result<bool, StoreError> {
        self.check_write()?;
        self.inner.compare_and_set_state(id, expected, next).await
    }

    async fn append_stage_outcome(
        &self,
        id: TaskId,
        outcome: StageOutcome,
    ) -> Result<(), StoreError> {
        self.inner.append_stage_outcome(id, outcome).await
    }

    async fn attach_report(&self, report: Report) -> Result<(), StoreError> {
        self.check_write()?;
        self.inner.attach_report(report).await
    }

    async fn set_failure(&self, id: TaskId, cause: FailureCause) -> Result<(), StoreError> {
        self.check_write()?;
        self.inner.set_failure(id, cause).await
    }

    async fn increment_requeue(&self, id: TaskId) -> Result<u32, StoreError> {
        self.inner.increment_requeue(id).await
    }

    async fn report(&self, id: TaskId) -> Result<Option<Report>, StoreError> {
        self.inner.report(id).await
    }

    async fn reset(&self, id: TaskId) -> Result<bool, StoreError> {
        self.inner.reset(id).await
    }
}

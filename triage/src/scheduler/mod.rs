//! Bounded-concurrency scheduler: admission, dispatch and recovery.
//!
//! The loop polls the task store for pending work in FIFO order, claims each
//! task with a compare-and-set (exactly one scheduler instance wins a task),
//! and hands it to a worker holding one of `workers` semaphore permits.
//! Terminal persistence is retried with backoff; a task whose sample never
//! materializes is requeued a bounded number of times and then failed.

use tokio::sync::Semaphore;
use tracing::{info, warn};

use std::sync::Arc;

use crate::cancellation::{CancelRegistry, CancelToken};
use crate::config::SchedulerConfig;
use crate::core::{FailureCause, SampleHandle, Task, TaskId, TaskState};
use crate::errors::{PipelineError, StoreError};
use crate::events::{EventSink, NoOpEventSink};
use crate::pipeline::PipelineDriver;
use crate::registry::ModuleRegistry;
use crate::retry::with_retry;
use crate::store::{SampleStore, TaskStore};

/// Drives task admission and execution against the store adapters.
///
/// Cheap to clone; all state is shared. One clone runs the loop, others
/// submit and cancel.
#[derive(Clone)]
pub struct Scheduler {
    store: Arc<dyn TaskStore>,
    samples: Arc<dyn SampleStore>,
    registry: Arc<ModuleRegistry>,
    config: SchedulerConfig,
    events: Arc<dyn EventSink>,
    cancels: Arc<CancelRegistry>,
    shutdown: Arc<CancelToken>,
    permits: Arc<Semaphore>,
    driver: Arc<PipelineDriver>,
}

impl Scheduler {
    /// Creates a scheduler over the given adapters and registry.
    #[must_use]
    pub fn new(
        store: Arc<dyn TaskStore>,
        samples: Arc<dyn SampleStore>,
        registry: Arc<ModuleRegistry>,
        config: SchedulerConfig,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(config.workers));
        Self {
            store,
            samples,
            registry,
            config,
            events: Arc::new(NoOpEventSink),
            cancels: Arc::new(CancelRegistry::new()),
            shutdown: Arc::new(CancelToken::new()),
            permits,
            driver: Arc::new(PipelineDriver::default()),
        }
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.driver = Arc::new(PipelineDriver::new(Arc::clone(&events)));
        self.events = events;
        self
    }

    /// Submits a sample for analysis and returns the new task id.
    ///
    /// # Errors
    ///
    /// Propagates store errors; `StoreError::Duplicate` cannot occur for a
    /// freshly generated id.
    pub async fn submit(&self, sample: SampleHandle) -> Result<TaskId, StoreError> {
        let task = Task::new(sample);
        let id = task.id;
        self.store.create(task).await?;
        self.events.try_emit(
            "task.submitted",
            Some(serde_json::json!({ "task": id.to_string() })),
        );
        Ok(id)
    }

    /// Requests cooperative cancellation of a task.
    ///
    /// A running task stops at the next stage boundary; a pending task is
    /// failed at admission without ever running. Unknown and already-terminal
    /// ids are ignored, so stray requests leave no token behind. Returns
    /// whether a cancellation was recorded.
    ///
    /// # Errors
    ///
    /// Propagates store errors from the task lookup.
    pub async fn cancel(
        &self,
        id: TaskId,
        reason: impl Into<String> + Send,
    ) -> Result<bool, StoreError> {
        match self.store.load(id).await? {
            Some(task) if !task.is_terminal() => {
                self.cancels.cancel(id, reason);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Stops admitting work. Running tasks finish; [`Scheduler::run`]
    /// returns once the loop observes the request.
    pub fn shutdown(&self, reason: impl Into<String>) {
        self.shutdown.cancel(reason);
    }

    /// Crash recovery: resets every `running` task back to `pending` with a
    /// cleared stage log, so reprocessing starts from scratch.
    ///
    /// Call once on startup, before [`Scheduler::run`].
    ///
    /// # Errors
    ///
    /// Propagates store errors.
    pub async fn recover(&self) -> Result<usize, StoreError> {
        let running = self.store.list_running().await?;
        let mut recovered = 0;
        for task in running {
            if self.store.reset(task.id).await? {
                recovered += 1;
                info!(task = %task.id, "reset orphaned running task");
            }
        }
        if recovered > 0 {
            self.events.try_emit(
                "scheduler.recovered",
                Some(serde_json::json!({ "tasks": recovered })),
            );
        }
        Ok(recovered)
    }

    /// Runs the scheduling loop until [`Scheduler::shutdown`] is called.
    pub async fn run(&self) {
        info!(workers = self.config.workers, "scheduler started");
        while !self.shutdown.is_cancelled() {
            let dispatched = match self.admit_pending().await {
                Ok(dispatched) => dispatched,
                Err(e) => {
                    // Store outage: pause dispatch, leave running tasks alone.
                    warn!(error = %e, "task store unavailable, pausing dispatch");
                    self.events.try_emit(
                        "scheduler.paused",
                        Some(serde_json::json!({ "error": e.to_string() })),
                    );
                    false
                }
            };

            if !dispatched {
                tokio::time::sleep(self.config.poll_interval()).await;
            }
        }

        // Drain: in-flight workers hold permits until their terminal
        // persistence finishes, so reclaiming the full budget means none
        // are left mid-task.
        let budget = u32::try_from(self.config.workers).unwrap_or(u32::MAX);
        if let Ok(drain) = self.permits.acquire_many(budget).await {
            drop(drain);
        }

        info!("scheduler stopped");
        self.events.try_emit("scheduler.stopped", None);
    }

    /// One admission pass. Returns whether any task was dispatched.
    async fn admit_pending(&self) -> Result<bool, StoreError> {
        let pending = self.store.list_pending().await?;
        let mut dispatched = false;

        for task in pending {
            if self.shutdown.is_cancelled() {
                break;
            }

            let token = self.cancels.token_for(task.id);
            if token.is_cancelled() {
                self.fail_without_running(
                    &task,
                    FailureCause::Cancelled {
                        reason: token.reason().unwrap_or_else(|| "unspecified".to_string()),
                    },
                )
                .await;
                continue;
            }

            if !self.samples.contains(&task.sample).await {
                self.handle_missing_sample(&task).await?;
                continue;
            }

            let Ok(permit) = Arc::clone(&self.permits).try_acquire_owned() else {
                // Pool saturated; later tasks keep their queue position.
                break;
            };

            // Claim the task; losing the race just means another loop owns it.
            if !self
                .store
                .compare_and_set_state(task.id, TaskState::Pending, TaskState::Running)
                .await?
            {
                drop(permit);
                continue;
            }

            dispatched = true;
            let scheduler = self.clone();
            tokio::spawn(async move {
                scheduler.process_task(task, token).await;
                drop(permit);
            });
        }

        Ok(dispatched)
    }

    /// Counts an admission pass against a task whose sample is not yet
    /// stored, failing it once the bound is reached.
    async fn handle_missing_sample(&self, task: &Task) -> Result<(), StoreError> {
        let attempts = self.store.increment_requeue(task.id).await?;
        if attempts < self.config.max_requeue_attempts {
            return Ok(());
        }
        self.fail_without_running(task, FailureCause::MissingSample { attempts })
            .await;
        Ok(())
    }

    /// Fails a task straight out of `pending`.
    async fn fail_without_running(&self, task: &Task, cause: FailureCause) {
        let moved = match self
            .store
            .compare_and_set_state(task.id, TaskState::Pending, TaskState::Failed)
            .await
        {
            Ok(moved) => moved,
            Err(e) => {
                warn!(task = %task.id, error = %e, "failed to mark task failed");
                return;
            }
        };
        if !moved {
            return;
        }
        if let Err(e) = self.store.set_failure(task.id, cause.clone()).await {
            warn!(task = %task.id, error = %e, "failed to record failure cause");
        }
        self.cancels.remove(task.id);
        self.events.try_emit(
            "task.failed",
            Some(serde_json::json!({
                "task": task.id.to_string(),
                "cause": cause.to_string(),
            })),
        );
    }

    /// Worker body: fetch content, drive the pipeline, persist the result.
    async fn process_task(&self, task: Task, cancel: Arc<CancelToken>) {
        self.events.try_emit(
            "task.started",
            Some(serde_json::json!({ "task": task.id.to_string() })),
        );

        let content = match self.samples.fetch(&task.sample).await {
            Ok(content) => content,
            Err(e) => {
                warn!(task = %task.id, error = %e, "sample fetch failed");
                self.finish_failed(
                    &task,
                    FailureCause::MissingSample {
                        attempts: task.requeue_attempts,
                    },
                )
                .await;
                return;
            }
        };

        match self
            .driver
            .process(&self.registry, self.store.as_ref(), &task, content, &cancel)
            .await
        {
            Ok(report) => self.finish_completed(&task, report).await,
            Err(e) => {
                let cause = match e {
                    PipelineError::AllStagesFailed => FailureCause::AllStagesFailed,
                    PipelineError::Cancelled { reason } => FailureCause::Cancelled { reason },
                    PipelineError::KeyCollision(collision) => FailureCause::Configuration {
                        message: collision.to_string(),
                    },
                };
                self.finish_failed(&task, cause).await;
            }
        }
    }

    /// Terminal persistence for a completed task, retried with backoff.
    ///
    /// The `running -> completed` transition is won first; the report is
    /// attached only after winning it. A lost transition means another
    /// instance reset the task and owns reprocessing, so nothing is attached
    /// and no event fires.
    async fn finish_completed(&self, task: &Task, report: crate::core::Report) {
        let won = with_retry(&self.config.persistence_retry, || {
            self.store
                .compare_and_set_state(task.id, TaskState::Running, TaskState::Completed)
        })
        .await;

        match won {
            Ok(true) => {
                let attached = with_retry(&self.config.persistence_retry, || {
                    let report = report.clone();
                    async move { self.store.attach_report(report).await }
                })
                .await;

                self.cancels.remove(task.id);
                match attached {
                    Ok(()) => {
                        self.events.try_emit(
                            "task.completed",
                            Some(serde_json::json!({ "task": task.id.to_string() })),
                        );
                    }
                    Err(e) => {
                        warn!(task = %task.id, error = %e, "report attachment exhausted retries");
                    }
                }
            }
            Ok(false) => {
                info!(task = %task.id, "lost terminal transition, standing down");
            }
            Err(e) => {
                warn!(task = %task.id, error = %e, "terminal persistence exhausted retries");
                self.finish_failed(
                    task,
                    FailureCause::Persistence {
                        message: e.to_string(),
                    },
                )
                .await;
            }
        }
    }

    /// Terminal persistence for a failed task, retried with backoff.
    ///
    /// Mirrors [`Scheduler::finish_completed`]: the failure cause is recorded
    /// only after winning the `running -> failed` transition. If even the
    /// transition cannot be written the task stays `running` and a later
    /// [`Scheduler::recover`] pass requeues it.
    async fn finish_failed(&self, task: &Task, cause: FailureCause) {
        let won = with_retry(&self.config.persistence_retry, || {
            self.store
                .compare_and_set_state(task.id, TaskState::Running, TaskState::Failed)
        })
        .await;

        match won {
            Ok(true) => {
                let recorded = with_retry(&self.config.persistence_retry, || {
                    let cause = cause.clone();
                    async move { self.store.set_failure(task.id, cause).await }
                })
                .await;

                self.cancels.remove(task.id);
                match recorded {
                    Ok(()) => {
                        self.events.try_emit(
                            "task.failed",
                            Some(serde_json::json!({
                                "task": task.id.to_string(),
                                "cause": cause.to_string(),
                            })),
                        );
                    }
                    Err(e) => {
                        warn!(task = %task.id, error = %e, "could not record failure cause");
                    }
                }
            }
            Ok(false) => {
                info!(task = %task.id, "lost terminal transition, standing down");
            }
            Err(e) => {
                warn!(task = %task.id, error = %e, "could not persist failure marker");
            }
        }
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

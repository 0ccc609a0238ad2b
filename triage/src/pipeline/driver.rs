//! Drives all applicable stages for one task and assembles the report.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

use crate::accumulator::ResultAccumulator;
use crate::cancellation::CancelToken;
use crate::core::{Report, SampleMetadata, StageOutcome, Task};
use crate::errors::PipelineError;
use crate::events::{EventSink, NoOpEventSink};
use crate::registry::{ModuleRegistry, RegisteredStage, StageCategory};
use crate::runner::StageRunner;
use crate::stages::StageContext;
use crate::store::TaskStore;

/// Runs every applicable stage for one task, in registry order, and turns
/// the surviving output into a [`Report`].
///
/// Analysis stages feed a task-private accumulator; a stage failure or
/// timeout is recorded and the pipeline moves on. Reporting stages run after
/// the accumulator is finalized and render sections; their failures are
/// recorded but never fail the task. Cancellation is honored between stages.
pub struct PipelineDriver {
    runner: StageRunner,
    events: Arc<dyn EventSink>,
}

impl Default for PipelineDriver {
    fn default() -> Self {
        Self::new(Arc::new(NoOpEventSink))
    }
}

impl PipelineDriver {
    /// Creates a driver emitting to the given sink.
    #[must_use]
    pub fn new(events: Arc<dyn EventSink>) -> Self {
        Self {
            runner: StageRunner::new(Arc::clone(&events)),
            events,
        }
    }

    /// Processes one task end to end.
    ///
    /// The store is only used for best-effort progress appends; the returned
    /// report is the authoritative result and the caller persists it.
    ///
    /// # Errors
    ///
    /// - `PipelineError::Cancelled` when the token fires between stages.
    /// - `PipelineError::AllStagesFailed` when at least one analysis stage
    ///   executed and none succeeded.
    /// - `PipelineError::KeyCollision` when two stages produced the same
    ///   field key.
    pub async fn process(
        &self,
        registry: &ModuleRegistry,
        store: &dyn TaskStore,
        task: &Task,
        content: Arc<Vec<u8>>,
        cancel: &CancelToken,
    ) -> Result<Report, PipelineError> {
        let metadata = SampleMetadata::from_content(task.sample.clone(), &content);
        let stages = registry.ordered_stages(&metadata);

        let mut accumulator = ResultAccumulator::new();
        let mut stage_log: Vec<StageOutcome> = Vec::new();
        let mut executed = 0usize;
        let mut succeeded = 0usize;

        for registered in stages
            .iter()
            .filter(|r| r.descriptor.category == StageCategory::Analysis)
        {
            self.check_cancelled(cancel)?;

            if let Some(outcome) = self.deferred_skip(registered, &accumulator) {
                self.record(store, task, &mut stage_log, outcome).await;
                continue;
            }

            let ctx = StageContext::new(
                task.id,
                metadata.clone(),
                Arc::clone(&content),
                accumulator.snapshot(),
            );
            let outcome = self.runner.run(registered, &ctx, &mut accumulator).await?;
            executed += 1;
            if outcome.status.is_success() {
                succeeded += 1;
            }
            self.record(store, task, &mut stage_log, outcome).await;
        }

        if executed > 0 && succeeded == 0 {
            return Err(PipelineError::AllStagesFailed);
        }

        let findings = accumulator.finalize();
        let mut sections: HashMap<String, serde_json::Value> = HashMap::new();

        for registered in stages
            .iter()
            .filter(|r| r.descriptor.category == StageCategory::Reporting)
        {
            self.check_cancelled(cancel)?;

            let ctx = StageContext::new(
                task.id,
                metadata.clone(),
                Arc::clone(&content),
                findings.clone(),
            );
            // Each reporting stage renders into its own empty map, so merges
            // cannot collide across reporting stages.
            let mut section = ResultAccumulator::new();
            let outcome = self.runner.run(registered, &ctx, &mut section).await?;
            if outcome.status.is_success() {
                sections.insert(
                    registered.descriptor.name.clone(),
                    serde_json::json!(section.finalize()),
                );
            }
            self.record(store, task, &mut stage_log, outcome).await;
        }

        Ok(Report {
            task_id: task.id,
            sample: task.sample.clone(),
            generated_at: Utc::now(),
            findings,
            sections,
            stage_log,
        })
    }

    fn check_cancelled(&self, cancel: &CancelToken) -> Result<(), PipelineError> {
        if cancel.is_cancelled() {
            let reason = cancel
                .reason()
                .unwrap_or_else(|| "unspecified".to_string());
            self.events
                .try_emit("task.cancelled", Some(serde_json::json!({ "reason": reason })));
            return Err(PipelineError::Cancelled { reason });
        }
        Ok(())
    }

    fn deferred_skip(
        &self,
        registered: &RegisteredStage,
        accumulator: &ResultAccumulator,
    ) -> Option<StageOutcome> {
        let key = registered.descriptor.applicability.deferred_field()?;
        if accumulator.contains_key(key) {
            return None;
        }
        self.events.try_emit(
            "stage.skipped",
            Some(serde_json::json!({
                "stage": registered.descriptor.name,
                "missing_field": key,
            })),
        );
        Some(StageOutcome::skipped(
            registered.descriptor.name.as_str(),
            format!("missing field '{key}'"),
        ))
    }

    /// Progress appends are best-effort; the finalized report carries the
    /// authoritative log.
    async fn record(
        &self,
        store: &dyn TaskStore,
        task: &Task,
        stage_log: &mut Vec<StageOutcome>,
        outcome: StageOutcome,
    ) {
        if let Err(e) = store.append_stage_outcome(task.id, outcome.clone()).await {
            warn!(task = %task.id, error = %e, "failed to append stage outcome");
        }
        stage_log.push(outcome);
    }
}

impl std::fmt::Debug for PipelineDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineDriver").finish()
    }
}

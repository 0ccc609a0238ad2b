//! Single-stage execution with timeout enforcement and write isolation.

use std::sync::Arc;
use std::time::Instant;

use crate::accumulator::ResultAccumulator;
use crate::core::StageOutcome;
use crate::errors::KeyCollisionError;
use crate::events::{EventSink, NoOpEventSink};
use crate::registry::RegisteredStage;
use crate::stages::StageContext;

/// Runs one stage against one task under the stage's time budget.
///
/// Stage output stays in the stage's own map until it succeeds; timed-out and
/// failed executions therefore never leak partial fields into the
/// accumulator.
#[derive(Clone)]
pub struct StageRunner {
    events: Arc<dyn EventSink>,
}

impl Default for StageRunner {
    fn default() -> Self {
        Self {
            events: Arc::new(NoOpEventSink),
        }
    }
}

impl StageRunner {
    /// Creates a runner emitting to the given sink.
    #[must_use]
    pub fn new(events: Arc<dyn EventSink>) -> Self {
        Self { events }
    }

    /// Executes a stage and merges its output on success.
    ///
    /// # Errors
    ///
    /// Returns `KeyCollisionError` when the stage's output rewrites an
    /// existing field. That is a registry misconfiguration and aborts the
    /// task; stage-internal failures are folded into the returned outcome
    /// instead.
    pub async fn run(
        &self,
        registered: &RegisteredStage,
        ctx: &StageContext,
        accumulator: &mut ResultAccumulator,
    ) -> Result<StageOutcome, KeyCollisionError> {
        let name = registered.descriptor.name.as_str();
        let start = Instant::now();

        self.events.try_emit(
            "stage.started",
            Some(serde_json::json!({ "stage": name, "task": ctx.task_id().to_string() })),
        );

        let outcome =
            match tokio::time::timeout(registered.descriptor.timeout, registered.stage.execute(ctx))
                .await
            {
                Err(_) => {
                    self.events.try_emit(
                        "stage.timed_out",
                        Some(serde_json::json!({
                            "stage": name,
                            "timeout_ms": registered.descriptor.timeout.as_millis() as u64,
                        })),
                    );
                    StageOutcome::timed_out(name, start.elapsed())
                }
                Ok(Err(error)) => {
                    self.events.try_emit(
                        "stage.failed",
                        Some(serde_json::json!({ "stage": name, "error": error.to_string() })),
                    );
                    StageOutcome::failed(name, error.to_string(), start.elapsed())
                }
                Ok(Ok(data)) => {
                    accumulator.merge(name, data)?;
                    self.events.try_emit(
                        "stage.completed",
                        Some(serde_json::json!({
                            "stage": name,
                            "duration_ms": start.elapsed().as_secs_f64() * 1000.0,
                        })),
                    );
                    StageOutcome::succeeded(name, start.elapsed())
                }
            };

        Ok(outcome)
    }
}

impl std::fmt::Debug for StageRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageRunner").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::OutcomeStatus;
    use crate::registry::StageDescriptor;
    use crate::stages::test_support::context_for;
    use crate::testing::mocks::{FailingStage, SleepStage, StaticStage};
    use std::collections::HashMap;
    use std::time::Duration;

    fn registered(descriptor: StageDescriptor, stage: Arc<dyn crate::stages::Stage>) -> RegisteredStage {
        RegisteredStage { descriptor, stage }
    }

    #[tokio::test]
    async fn test_success_merges_fields() {
        let mut data = HashMap::new();
        data.insert("k".to_string(), serde_json::json!(1));
        let reg = registered(
            StageDescriptor::analysis("s", 0),
            Arc::new(StaticStage::new(data)),
        );

        let mut acc = ResultAccumulator::new();
        let outcome = StageRunner::default()
            .run(&reg, &context_for(b"x"), &mut acc)
            .await
            .unwrap();

        assert_eq!(outcome.status, OutcomeStatus::Succeeded);
        assert_eq!(acc.get("k"), Some(&serde_json::json!(1)));
    }

    #[tokio::test]
    async fn test_failure_leaves_accumulator_untouched() {
        let reg = registered(
            StageDescriptor::analysis("s", 0),
            Arc::new(FailingStage::new("io", "read error")),
        );

        let mut acc = ResultAccumulator::new();
        let outcome = StageRunner::default()
            .run(&reg, &context_for(b"x"), &mut acc)
            .await
            .unwrap();

        assert!(outcome.status.is_failure());
        assert!(acc.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_discards_output() {
        let mut data = HashMap::new();
        data.insert("late".to_string(), serde_json::json!(true));
        let reg = registered(
            StageDescriptor::analysis("slow", 0).with_timeout(Duration::from_millis(50)),
            Arc::new(SleepStage::new(Duration::from_secs(10), data)),
        );

        let mut acc = ResultAccumulator::new();
        let keys_before = acc.keys();
        let outcome = StageRunner::default()
            .run(&reg, &context_for(b"x"), &mut acc)
            .await
            .unwrap();

        assert_eq!(outcome.status, OutcomeStatus::TimedOut);
        assert_eq!(acc.keys(), keys_before);
    }

    #[tokio::test]
    async fn test_collision_surfaces() {
        let mut data = HashMap::new();
        data.insert("dup".to_string(), serde_json::json!(1));

        let first = registered(
            StageDescriptor::analysis("a", 0),
            Arc::new(StaticStage::new(data.clone())),
        );
        let second = registered(
            StageDescriptor::analysis("b", 1),
            Arc::new(StaticStage::new(data)),
        );

        let runner = StageRunner::default();
        let mut acc = ResultAccumulator::new();
        let ctx = context_for(b"x");

        runner.run(&first, &ctx, &mut acc).await.unwrap();
        let err = runner.run(&second, &ctx, &mut acc).await.unwrap_err();

        assert_eq!(err.stage, "b");
        assert_eq!(err.key, "dup");
    }
}

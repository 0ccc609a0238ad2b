//! End-to-end driver scenarios over the in-memory stores.

use pretty_assertions::assert_eq;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::cancellation::CancelToken;
use crate::core::{OutcomeStatus, SampleHandle, StageData, Task};
use crate::errors::PipelineError;
use crate::pipeline::PipelineDriver;
use crate::registry::{default_registry, Applicability, ModuleRegistry, StageDescriptor};
use crate::stages::Stage;
use crate::store::{InMemoryTaskStore, TaskStore};
use crate::testing::fixtures::{pe_sample, text_sample};
use crate::testing::mocks::{FailingStage, SleepStage, StaticStage};

struct Setup {
    store: InMemoryTaskStore,
    task: Task,
    content: Arc<Vec<u8>>,
}

async fn setup(bytes: &[u8]) -> Setup {
    let store = InMemoryTaskStore::new();
    let task = Task::new(SampleHandle::from_bytes(bytes));
    store.create(task.clone()).await.unwrap();
    Setup {
        store,
        task,
        content: Arc::new(bytes.to_vec()),
    }
}

fn registry_of(stages: Vec<(StageDescriptor, Arc<dyn Stage>)>) -> ModuleRegistry {
    let mut registry = ModuleRegistry::new();
    for (descriptor, stage) in stages {
        registry.register(descriptor, stage).unwrap();
    }
    registry
}

#[tokio::test]
async fn test_text_sample_full_pipeline() {
    let s = setup(&text_sample()).await;
    let registry = default_registry().unwrap();
    let driver = PipelineDriver::default();

    let report = driver
        .process(&registry, &s.store, &s.task, s.content, &CancelToken::new())
        .await
        .unwrap();

    // Strings feed signatures; both URL and shell rules fire on the fixture.
    assert_eq!(report.findings["signatures.count"], serde_json::json!(2));
    assert_eq!(
        report.sections["summary"]["suspicious"],
        serde_json::json!(true)
    );
    assert!(report.sections.contains_key("jsondump"));

    // exe_header was filtered out for a non-executable, not run and failed.
    assert!(!report
        .stage_log
        .iter()
        .any(|o| o.stage == "exe_header"));
    assert!(report
        .stage_log
        .iter()
        .all(|o| o.status.is_success()));
}

#[tokio::test]
async fn test_pe_sample_gets_header_fields() {
    let s = setup(&pe_sample()).await;
    let registry = default_registry().unwrap();

    let report = PipelineDriver::default()
        .process(&registry, &s.store, &s.task, s.content, &CancelToken::new())
        .await
        .unwrap();

    assert_eq!(report.findings["exe.kind"], serde_json::json!("pe"));
    assert_eq!(report.findings["exe.machine"], serde_json::json!("x64"));
}

#[tokio::test]
async fn test_processing_is_idempotent() {
    let s = setup(&text_sample()).await;
    let registry = default_registry().unwrap();
    let driver = PipelineDriver::default();

    let first = driver
        .process(
            &registry,
            &s.store,
            &s.task,
            Arc::clone(&s.content),
            &CancelToken::new(),
        )
        .await
        .unwrap();
    let second = driver
        .process(&registry, &s.store, &s.task, s.content, &CancelToken::new())
        .await
        .unwrap();

    assert_eq!(first.field_keys(), second.field_keys());
    assert_eq!(first.findings["hashes.sha256"], second.findings["hashes.sha256"]);
}

#[tokio::test(start_paused = true)]
async fn test_timed_out_stage_contributes_nothing() {
    let s = setup(b"bytes").await;
    let mut late = StageData::new();
    late.insert("late.field".to_string(), serde_json::json!(true));

    let registry = registry_of(vec![
        (
            StageDescriptor::analysis("fast", 0),
            Arc::new(StaticStage::single("fast.field", serde_json::json!(1))),
        ),
        (
            StageDescriptor::analysis("slow", 10).with_timeout(Duration::from_millis(10)),
            Arc::new(SleepStage::new(Duration::from_secs(60), late)),
        ),
    ]);

    let report = PipelineDriver::default()
        .process(&registry, &s.store, &s.task, s.content, &CancelToken::new())
        .await
        .unwrap();

    assert_eq!(report.field_keys(), vec!["fast.field"]);
    let slow = report
        .stage_log
        .iter()
        .find(|o| o.stage == "slow")
        .unwrap();
    assert_eq!(slow.status, OutcomeStatus::TimedOut);
}

#[tokio::test]
async fn test_missing_field_dependency_skips() {
    let s = setup(b"bytes").await;
    let registry = registry_of(vec![
        (
            StageDescriptor::analysis("producer", 0),
            Arc::new(FailingStage::new("io", "boom")),
        ),
        (
            StageDescriptor::analysis("consumer", 10)
                .with_applicability(Applicability::requires_field("producer.out")),
            Arc::new(StaticStage::single("consumer.out", serde_json::json!(1))),
        ),
        (
            StageDescriptor::analysis("bystander", 20),
            Arc::new(StaticStage::single("bystander.out", serde_json::json!(2))),
        ),
    ]);

    let report = PipelineDriver::default()
        .process(&registry, &s.store, &s.task, s.content, &CancelToken::new())
        .await
        .unwrap();

    let consumer = report
        .stage_log
        .iter()
        .find(|o| o.stage == "consumer")
        .unwrap();
    assert!(matches!(consumer.status, OutcomeStatus::Skipped { .. }));
    assert_eq!(report.field_keys(), vec!["bystander.out"]);
}

#[tokio::test]
async fn test_all_executed_stages_failing_fails_task() {
    let s = setup(b"bytes").await;
    let registry = registry_of(vec![
        (
            StageDescriptor::analysis("a", 0),
            Arc::new(FailingStage::new("io", "boom")),
        ),
        (
            StageDescriptor::analysis("b", 10),
            Arc::new(FailingStage::new("io", "boom")),
        ),
    ]);

    let err = PipelineDriver::default()
        .process(&registry, &s.store, &s.task, s.content, &CancelToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::AllStagesFailed));
}

#[tokio::test]
async fn test_everything_skipped_is_not_failure() {
    let s = setup(b"bytes").await;
    let registry = registry_of(vec![(
        StageDescriptor::analysis("consumer", 0)
            .with_applicability(Applicability::requires_field("never.produced")),
        Arc::new(StaticStage::single("consumer.out", serde_json::json!(1))),
    )]);

    let report = PipelineDriver::default()
        .process(&registry, &s.store, &s.task, s.content, &CancelToken::new())
        .await
        .unwrap();

    assert!(report.findings.is_empty());
    assert_eq!(report.stage_log.len(), 1);
}

#[tokio::test]
async fn test_key_collision_aborts() {
    let s = setup(b"bytes").await;
    let registry = registry_of(vec![
        (
            StageDescriptor::analysis("first", 0),
            Arc::new(StaticStage::single("shared.key", serde_json::json!(1))),
        ),
        (
            StageDescriptor::analysis("second", 10),
            Arc::new(StaticStage::single("shared.key", serde_json::json!(2))),
        ),
    ]);

    let err = PipelineDriver::default()
        .process(&registry, &s.store, &s.task, s.content, &CancelToken::new())
        .await
        .unwrap_err();
    match err {
        PipelineError::KeyCollision(collision) => {
            assert_eq!(collision.stage, "second");
            assert_eq!(collision.key, "shared.key");
        }
        other => panic!("expected key collision, got {other:?}"),
    }
}

#[tokio::test]
async fn test_cancelled_before_first_stage() {
    let s = setup(b"bytes").await;
    let registry = default_registry().unwrap();
    let cancel = CancelToken::new();
    cancel.cancel("operator request");

    let err = PipelineDriver::default()
        .process(&registry, &s.store, &s.task, s.content, &cancel)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Cancelled { reason } if reason == "operator request"
    ));
}

#[tokio::test]
async fn test_reporting_failure_does_not_fail_task() {
    let s = setup(b"bytes").await;
    let registry = registry_of(vec![
        (
            StageDescriptor::analysis("analysis", 0),
            Arc::new(StaticStage::single("a.field", serde_json::json!(1))),
        ),
        (
            StageDescriptor::reporting("broken_report", 0),
            Arc::new(FailingStage::new("render", "template error")),
        ),
    ]);

    let report = PipelineDriver::default()
        .process(&registry, &s.store, &s.task, s.content, &CancelToken::new())
        .await
        .unwrap();

    assert!(report.sections.is_empty());
    let broken = report
        .stage_log
        .iter()
        .find(|o| o.stage == "broken_report")
        .unwrap();
    assert!(broken.status.is_failure());
}

#[tokio::test]
async fn test_progress_appended_to_store() {
    let s = setup(&text_sample()).await;
    let registry = default_registry().unwrap();

    PipelineDriver::default()
        .process(&registry, &s.store, &s.task, s.content, &CancelToken::new())
        .await
        .unwrap();

    let stored = s.store.load(s.task.id).await.unwrap().unwrap();
    assert!(!stored.stage_log.is_empty());
}

#[tokio::test]
async fn test_reporting_sections_keyed_by_stage() {
    let s = setup(b"bytes").await;
    let mut section = StageData::new();
    section.insert("lines".to_string(), serde_json::json!(3));

    let registry = registry_of(vec![
        (
            StageDescriptor::analysis("analysis", 0),
            Arc::new(StaticStage::single("a.field", serde_json::json!(1))),
        ),
        (
            StageDescriptor::reporting("custom", 0),
            Arc::new(StaticStage::new(section)),
        ),
    ]);

    let report = PipelineDriver::default()
        .process(&registry, &s.store, &s.task, s.content, &CancelToken::new())
        .await
        .unwrap();

    let sections: HashMap<String, serde_json::Value> = report.sections;
    assert_eq!(sections["custom"]["lines"], serde_json::json!(3));
}

//! # Triage
//!
//! A static sample triage core: submitted binaries are analyzed by a
//! registry of pluggable stages under a bounded-concurrency scheduler.
//!
//! The moving parts:
//!
//! - **Module registry**: ordered, applicability-filtered analysis and
//!   reporting stages
//! - **Stage runner**: per-stage timeouts with write-then-commit field merges
//! - **Pipeline driver**: the per-task stage loop, partial-failure tolerant
//! - **Scheduler**: FIFO admission, compare-and-set task ownership, crash
//!   recovery and cooperative cancellation
//! - **Store adapters**: swappable task-record and sample-content backends
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use triage::prelude::*;
//!
//! let store = Arc::new(InMemoryTaskStore::new());
//! let samples = Arc::new(InMemorySampleStore::new());
//! let registry = Arc::new(default_registry()?);
//!
//! let scheduler = Scheduler::new(store, samples, registry, SchedulerConfig::default());
//! scheduler.recover().await?;
//!
//! let id = scheduler.submit(handle).await?;
//! scheduler.run().await;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod accumulator;
pub mod cancellation;
pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod observability;
pub mod pipeline;
pub mod registry;
pub mod retry;
pub mod runner;
pub mod scheduler;
pub mod stages;
pub mod store;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::accumulator::ResultAccumulator;
    pub use crate::cancellation::{CancelRegistry, CancelToken};
    pub use crate::config::SchedulerConfig;
    pub use crate::core::{
        FailureCause, OutcomeStatus, Report, SampleFormat, SampleHandle, SampleMetadata,
        StageData, StageOutcome, Task, TaskId, TaskState,
    };
    pub use crate::errors::{
        DuplicateStageError, DuplicateTaskError, KeyCollisionError, PipelineError,
        SampleStoreError, StageError, StoreError, TriageError,
    };
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::pipeline::PipelineDriver;
    pub use crate::registry::{
        default_registry, Applicability, ModuleRegistry, RegisteredStage, StageCategory,
        StageDescriptor,
    };
    pub use crate::retry::{with_retry, RetryConfig};
    pub use crate::runner::StageRunner;
    pub use crate::scheduler::Scheduler;
    pub use crate::stages::{Stage, StageContext};
    pub use crate::store::{
        InMemorySampleStore, InMemoryTaskStore, SampleStore, TaskStore,
    };
}

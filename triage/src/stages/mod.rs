//! Stage contract and built-in analysis/reporting stages.
//!
//! Stages are the pluggable units of work driven by the pipeline. Each stage
//! reads the sample content plus a snapshot of fields produced so far, and
//! returns its own field map; the runner merges it only on success.

mod exe_header;
mod hashes;
mod identify;
mod reporting;
mod signatures;
mod strings;

pub use exe_header::ExecutableHeaderStage;
pub use hashes::HashStage;
pub use identify::IdentifyStage;
pub use reporting::{JsonDumpStage, SummaryStage};
pub use signatures::{SignatureRule, SignatureStage};
pub use strings::StringsStage;

use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;

use crate::core::{SampleMetadata, StageData, TaskId};
use crate::errors::StageError;

/// Execution context handed to one stage invocation.
///
/// The field snapshot is read-only; stages never mutate shared state.
#[derive(Debug, Clone)]
pub struct StageContext {
    task_id: TaskId,
    metadata: SampleMetadata,
    content: Arc<Vec<u8>>,
    fields: StageData,
}

impl StageContext {
    /// Creates a context for one stage invocation.
    #[must_use]
    pub fn new(
        task_id: TaskId,
        metadata: SampleMetadata,
        content: Arc<Vec<u8>>,
        fields: StageData,
    ) -> Self {
        Self {
            task_id,
            metadata,
            content,
            fields,
        }
    }

    /// The task being processed.
    #[must_use]
    pub const fn task_id(&self) -> TaskId {
        self.task_id
    }

    /// Sample metadata (size, sniffed format).
    #[must_use]
    pub const fn metadata(&self) -> &SampleMetadata {
        &self.metadata
    }

    /// The raw sample bytes.
    #[must_use]
    pub fn content(&self) -> &[u8] {
        &self.content
    }

    /// Looks up a field produced by an earlier stage.
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&serde_json::Value> {
        self.fields.get(key)
    }

    /// Returns true if an earlier stage produced the field.
    #[must_use]
    pub fn has_field(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// The full field snapshot.
    #[must_use]
    pub const fn field_map(&self) -> &StageData {
        &self.fields
    }
}

/// A pluggable analysis or reporting stage.
///
/// Implementations must be deterministic for idempotent reprocessing, and
/// must not touch anything outside the returned field map.
#[async_trait]
pub trait Stage: Send + Sync + Debug {
    /// Executes the stage against one sample.
    ///
    /// # Errors
    ///
    /// A `StageError` is recorded as a `failed` outcome; it never aborts
    /// sibling stages.
    async fn execute(&self, ctx: &StageContext) -> Result<StageData, StageError>;
}

//! Per-task result accumulator.
//!
//! Exclusively owned by the worker driving one task; no locking, no
//! cross-task sharing. Stage output is merged only after the stage succeeds,
//! so failed or timed-out stages contribute nothing.

use crate::core::StageData;
use crate::errors::KeyCollisionError;

/// Mutable mapping from field key to stage-produced data for one task.
#[derive(Debug, Clone, Default)]
pub struct ResultAccumulator {
    fields: StageData,
}

impl ResultAccumulator {
    /// Creates an empty accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges a successful stage's output.
    ///
    /// The whole batch is checked before anything is inserted: a collision
    /// leaves the accumulator unchanged.
    ///
    /// # Errors
    ///
    /// Returns `KeyCollisionError` if any produced key already exists. Two
    /// stages writing the same field is a configuration bug, surfaced rather
    /// than silently overwritten.
    pub fn merge(&mut self, stage: &str, data: StageData) -> Result<(), KeyCollisionError> {
        if let Some(key) = data.keys().find(|k| self.fields.contains_key(*k)) {
            return Err(KeyCollisionError::new(stage, key));
        }
        self.fields.extend(data);
        Ok(())
    }

    /// Gets a field value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.fields.get(key)
    }

    /// Checks whether a field exists.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// Returns the sorted set of field keys.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.fields.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Returns the number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if no fields have been merged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Returns a read-only copy of the current fields for stage input.
    #[must_use]
    pub fn snapshot(&self) -> StageData {
        self.fields.clone()
    }

    /// Consumes the accumulator into the immutable findings map.
    #[must_use]
    pub fn finalize(self) -> StageData {
        self.fields
    }
}

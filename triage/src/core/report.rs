//! The finalized, immutable report document.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::outcome::StageOutcome;
use super::sample::SampleHandle;
use super::task::TaskId;

/// Finalized document attached to a completed task.
///
/// Produced exactly once per task; immutable after assembly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    /// The task this report belongs to.
    pub task_id: TaskId,
    /// Content address of the analyzed sample.
    pub sample: SampleHandle,
    /// When the report was assembled.
    pub generated_at: DateTime<Utc>,
    /// Finalized accumulator: every field the analysis stages produced.
    pub findings: HashMap<String, serde_json::Value>,
    /// Reporting-stage renderings, keyed by reporting stage name.
    pub sections: HashMap<String, serde_json::Value>,
    /// Snapshot of the stage log at assembly time.
    pub stage_log: Vec<StageOutcome>,
}

impl Report {
    /// Serializes the report to a JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Returns the sorted set of finding keys.
    #[must_use]
    pub fn field_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.findings.keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn sample_report() -> Report {
        let mut findings = HashMap::new();
        findings.insert("file.size".to_string(), serde_json::json!(42));
        findings.insert("file.format".to_string(), serde_json::json!("pe"));

        Report {
            task_id: TaskId::new(),
            sample: SampleHandle::from_bytes(b"bytes"),
            generated_at: Utc::now(),
            findings,
            sections: HashMap::new(),
            stage_log: vec![StageOutcome::succeeded("identify", Duration::from_millis(1))],
        }
    }

    #[test]
    fn test_field_keys_sorted() {
        let report = sample_report();
        assert_eq!(report.field_keys(), vec!["file.format", "file.size"]);
    }

    #[test]
    fn test_report_roundtrip() {
        let report = sample_report();
        let json = report.to_json().unwrap();
        let back: Report = serde_json::from_str(&json).unwrap();
        assert_eq!(back.task_id, report.task_id);
        assert_eq!(back.field_keys(), report.field_keys());
        assert_eq!(back.stage_log.len(), 1);
    }
}

//! Reporting stages: render sections from the finalized findings.
//!
//! Reporting stages run after analysis over the finalized accumulator; their
//! output becomes report sections instead of accumulator fields.

use async_trait::async_trait;

use super::{Stage, StageContext};
use crate::core::StageData;
use crate::errors::StageError;

/// Renders a compact triage summary section.
#[derive(Debug, Clone, Copy, Default)]
pub struct SummaryStage;

#[async_trait]
impl Stage for SummaryStage {
    async fn execute(&self, ctx: &StageContext) -> Result<StageData, StageError> {
        let matched_rules: Vec<String> = ctx
            .field("signatures.matches")
            .and_then(|v| v.as_array())
            .map(|matches| {
                matches
                    .iter()
                    .filter_map(|m| m["rule"].as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default();

        let mut data = StageData::new();
        data.insert(
            "format".to_string(),
            ctx.field("file.format")
                .cloned()
                .unwrap_or(serde_json::Value::Null),
        );
        data.insert(
            "sha256".to_string(),
            ctx.field("hashes.sha256")
                .cloned()
                .unwrap_or(serde_json::Value::Null),
        );
        data.insert("matched_rules".to_string(), serde_json::json!(matched_rules));
        data.insert(
            "suspicious".to_string(),
            serde_json::json!(!matched_rules.is_empty()),
        );
        Ok(data)
    }
}

/// Renders the complete findings map as a JSON string section.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonDumpStage;

#[async_trait]
impl Stage for JsonDumpStage {
    async fn execute(&self, ctx: &StageContext) -> Result<StageData, StageError> {
        let findings = serde_json::json!({
            "sample": ctx.metadata().handle.as_str(),
            "findings": ctx.field_map(),
        });
        let rendered = serde_json::to_string(&findings)
            .map_err(|e| StageError::new("serialization", e.to_string()))?;

        let mut data = StageData::new();
        data.insert("bytes".to_string(), serde_json::json!(rendered.len()));
        data.insert("rendered".to_string(), serde_json::json!(rendered));
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StageData;
    use crate::stages::test_support::context_with_fields;

    fn findings() -> StageData {
        let mut fields = StageData::new();
        fields.insert("file.format".to_string(), serde_json::json!("pe"));
        fields.insert("hashes.sha256".to_string(), serde_json::json!("abc123"));
        fields.insert(
            "signatures.matches".to_string(),
            serde_json::json!([{"rule": "embedded_url", "evidence": "http://x"}]),
        );
        fields
    }

    #[tokio::test]
    async fn test_summary_section() {
        let ctx = context_with_fields(b"sample", findings());
        let data = SummaryStage.execute(&ctx).await.unwrap();

        assert_eq!(data["format"], serde_json::json!("pe"));
        assert_eq!(data["sha256"], serde_json::json!("abc123"));
        assert_eq!(data["matched_rules"], serde_json::json!(["embedded_url"]));
        assert_eq!(data["suspicious"], serde_json::json!(true));
    }

    #[tokio::test]
    async fn test_summary_tolerates_missing_fields() {
        let ctx = context_with_fields(b"sample", StageData::new());
        let data = SummaryStage.execute(&ctx).await.unwrap();

        assert_eq!(data["format"], serde_json::Value::Null);
        assert_eq!(data["suspicious"], serde_json::json!(false));
    }

    #[tokio::test]
    async fn test_jsondump_roundtrips() {
        let ctx = context_with_fields(b"sample", findings());
        let data = JsonDumpStage.execute(&ctx).await.unwrap();

        let rendered = data["rendered"].as_str().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(rendered).unwrap();
        assert_eq!(parsed["findings"]["file.format"], "pe");
        assert_eq!(data["bytes"], serde_json::json!(rendered.len()));
    }
}

//! Sample identification: size, format and magic-byte preview.

use async_trait::async_trait;
use base64::Engine as _;

use super::{Stage, StageContext};
use crate::core::StageData;
use crate::errors::StageError;

/// Records basic facts about the sample. Always applicable.
#[derive(Debug, Clone)]
pub struct IdentifyStage {
    preview_len: usize,
}

impl IdentifyStage {
    /// Creates an identify stage with a custom preview length.
    #[must_use]
    pub const fn new(preview_len: usize) -> Self {
        Self { preview_len }
    }
}

impl Default for IdentifyStage {
    fn default() -> Self {
        Self { preview_len: 16 }
    }
}

#[async_trait]
impl Stage for IdentifyStage {
    async fn execute(&self, ctx: &StageContext) -> Result<StageData, StageError> {
        let content = ctx.content();
        let preview = &content[..content.len().min(self.preview_len)];

        let mut data = StageData::new();
        data.insert("file.size".to_string(), serde_json::json!(content.len()));
        data.insert(
            "file.format".to_string(),
            serde_json::json!(ctx.metadata().format.to_string()),
        );
        data.insert(
            "file.magic".to_string(),
            serde_json::json!(base64::engine::general_purpose::STANDARD.encode(preview)),
        );
        Ok(data)
    }
}

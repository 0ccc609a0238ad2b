//! Printable string extraction.

use async_trait::async_trait;

use super::{Stage, StageContext};
use crate::core::StageData;
use crate::errors::StageError;

/// Extracts printable-ASCII runs from the sample. Always applicable.
///
/// Signature matching consumes the extracted list, so this stage must run
/// before it.
#[derive(Debug, Clone)]
pub struct StringsStage {
    min_len: usize,
    max_strings: usize,
}

impl StringsStage {
    /// Creates a strings stage with custom limits.
    #[must_use]
    pub const fn new(min_len: usize, max_strings: usize) -> Self {
        Self {
            min_len,
            max_strings,
        }
    }
}

impl Default for StringsStage {
    fn default() -> Self {
        Self {
            min_len: 4,
            max_strings: 256,
        }
    }
}

fn is_printable(byte: u8) -> bool {
    (0x20..=0x7e).contains(&byte)
}

#[async_trait]
impl Stage for StringsStage {
    async fn execute(&self, ctx: &StageContext) -> Result<StageData, StageError> {
        let mut strings: Vec<String> = Vec::new();
        let mut total = 0usize;
        let mut run: Vec<u8> = Vec::new();

        for &byte in ctx.content().iter().chain(std::iter::once(&0u8)) {
            if is_printable(byte) {
                run.push(byte);
                continue;
            }
            if run.len() >= self.min_len {
                total += 1;
                if strings.len() < self.max_strings {
                    strings.push(String::from_utf8_lossy(&run).into_owned());
                }
            }
            run.clear();
        }

        let mut data = StageData::new();
        data.insert("strings.ascii".to_string(), serde_json::json!(strings));
        data.insert("strings.total".to_string(), serde_json::json!(total));
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::test_support::context_for;

    #[tokio::test]
    async fn test_extracts_runs() {
        let ctx = context_for(b"\x00\x01hello world\x02ok\x03another one\xff");
        let data = StringsStage::default().execute(&ctx).await.unwrap();

        let strings = data["strings.ascii"].as_array().unwrap();
        assert_eq!(strings.len(), 2);
        assert_eq!(strings[0], "hello world");
        assert_eq!(strings[1], "another one");
        // "ok" is below the minimum length.
        assert_eq!(data["strings.total"], serde_json::json!(2));
    }

    #[tokio::test]
    async fn test_trailing_run_captured() {
        let ctx = context_for(b"\x00ends with text");
        let data = StringsStage::default().execute(&ctx).await.unwrap();

        let strings = data["strings.ascii"].as_array().unwrap();
        assert_eq!(strings[0], "ends with text");
    }

    #[tokio::test]
    async fn test_cap_keeps_counting() {
        let mut bytes = Vec::new();
        for i in 0..10 {
            bytes.extend_from_slice(format!("string-number-{i}").as_bytes());
            bytes.push(0);
        }
        let ctx = context_for(&bytes);
        let data = StringsStage::new(4, 3).execute(&ctx).await.unwrap();

        assert_eq!(data["strings.ascii"].as_array().unwrap().len(), 3);
        assert_eq!(data["strings.total"], serde_json::json!(10));
    }

    #[tokio::test]
    async fn test_binary_only_sample() {
        let ctx = context_for(&[0u8, 1, 2, 3, 255, 254]);
        let data = StringsStage::default().execute(&ctx).await.unwrap();

        assert!(data["strings.ascii"].as_array().unwrap().is_empty());
        assert_eq!(data["strings.total"], serde_json::json!(0));
    }
}

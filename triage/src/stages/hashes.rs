//! Cryptographic digests of the sample content.

use async_trait::async_trait;
use md5::Md5;
use sha2::{Digest, Sha256, Sha512};

use super::{Stage, StageContext};
use crate::core::StageData;
use crate::errors::StageError;

/// Computes md5, sha256 and sha512 digests. Always applicable.
#[derive(Debug, Clone, Copy, Default)]
pub struct HashStage;

#[async_trait]
impl Stage for HashStage {
    async fn execute(&self, ctx: &StageContext) -> Result<StageData, StageError> {
        let content = ctx.content();

        let mut data = StageData::new();
        data.insert(
            "hashes.md5".to_string(),
            serde_json::json!(hex::encode(Md5::digest(content))),
        );
        data.insert(
            "hashes.sha256".to_string(),
            serde_json::json!(hex::encode(Sha256::digest(content))),
        );
        data.insert(
            "hashes.sha512".to_string(),
            serde_json::json!(hex::encode(Sha512::digest(content))),
        );
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::test_support::context_for;

    #[tokio::test]
    async fn test_known_digests() {
        let ctx = context_for(b"hello");
        let data = HashStage.execute(&ctx).await.unwrap();

        assert_eq!(
            data["hashes.md5"],
            serde_json::json!("5d41402abc4b2a76b9719d911017c592")
        );
        assert_eq!(
            data["hashes.sha256"],
            serde_json::json!("2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824")
        );
    }

    #[tokio::test]
    async fn test_sha512_length() {
        let ctx = context_for(b"hello");
        let data = HashStage.execute(&ctx).await.unwrap();

        let sha512 = data["hashes.sha512"].as_str().unwrap();
        assert_eq!(sha512.len(), 128);
    }

    #[tokio::test]
    async fn test_deterministic() {
        let ctx = context_for(b"same bytes");
        let first = HashStage.execute(&ctx).await.unwrap();
        let second = HashStage.execute(&ctx).await.unwrap();
        assert_eq!(first, second);
    }
}

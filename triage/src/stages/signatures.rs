//! Signature matching over extracted strings.

use async_trait::async_trait;
use regex::Regex;

use super::{Stage, StageContext};
use crate::core::StageData;
use crate::errors::StageError;

/// One named detection rule.
#[derive(Debug, Clone)]
pub struct SignatureRule {
    /// Rule name, reported on match.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    pattern: Regex,
}

impl SignatureRule {
    /// Compiles a rule from a regex pattern.
    ///
    /// # Errors
    ///
    /// Returns a regex compilation error for invalid patterns.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        pattern: &str,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            name: name.into(),
            description: description.into(),
            pattern: Regex::new(pattern)?,
        })
    }

    /// Returns true if the rule matches the string.
    #[must_use]
    pub fn matches(&self, candidate: &str) -> bool {
        self.pattern.is_match(candidate)
    }
}

/// Matches a rule set against the strings an earlier stage extracted.
///
/// Registered with `RequiresField("strings.ascii")`: when string extraction
/// failed or has not run, this stage is skipped, not failed.
#[derive(Debug, Clone)]
pub struct SignatureStage {
    rules: Vec<SignatureRule>,
}

impl SignatureStage {
    /// Creates a stage with a custom rule set.
    #[must_use]
    pub fn new(rules: Vec<SignatureRule>) -> Self {
        Self { rules }
    }

    /// Creates a stage with the built-in rule set.
    ///
    /// The patterns are static and known-valid, so compilation cannot fail.
    #[must_use]
    pub fn with_default_rules() -> Self {
        let rules = [
            (
                "embedded_url",
                "embedded HTTP(S) URL",
                r"(?i)https?://",
            ),
            (
                "shell_command",
                "references a command interpreter",
                r"(?i)cmd\.exe|powershell",
            ),
            ("upx_packer", "UPX packer marker", r"UPX[0-9!]"),
            (
                "process_injection_api",
                "process injection API name",
                r"VirtualAllocEx|CreateRemoteThread|WriteProcessMemory",
            ),
        ]
        .into_iter()
        .filter_map(|(name, description, pattern)| {
            SignatureRule::new(name, description, pattern).ok()
        })
        .collect();

        Self::new(rules)
    }

    /// Number of rules in the set.
    #[must_use]
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }
}

#[async_trait]
impl Stage for SignatureStage {
    async fn execute(&self, ctx: &StageContext) -> Result<StageData, StageError> {
        let strings: Vec<String> = ctx
            .field("strings.ascii")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .ok_or_else(|| {
                StageError::new("missing_input", "field 'strings.ascii' is not a string list")
            })?;

        let mut matches = Vec::new();
        for rule in &self.rules {
            if let Some(evidence) = strings.iter().find(|s| rule.matches(s)) {
                matches.push(serde_json::json!({
                    "rule": rule.name,
                    "description": rule.description,
                    "evidence": evidence,
                }));
            }
        }

        let mut data = StageData::new();
        data.insert("signatures.count".to_string(), serde_json::json!(matches.len()));
        data.insert("signatures.matches".to_string(), serde_json::json!(matches));
        Ok(data)
    }
}

//! Sample handles, format sniffing and per-sample metadata.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Content address of an immutable stored sample (sha256, lowercase hex).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SampleHandle(String);

impl SampleHandle {
    /// Computes the handle for a byte buffer.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(hex::encode(Sha256::digest(bytes)))
    }

    /// Wraps an already-computed sha256 hex digest.
    #[must_use]
    pub fn from_hex(digest: impl Into<String>) -> Self {
        Self(digest.into())
    }

    /// The hex digest as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SampleHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Container format recognized from leading magic bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleFormat {
    /// Windows PE image (`MZ`).
    Pe,
    /// ELF image (`\x7fELF`).
    Elf,
    /// Zip archive (`PK\x03\x04`).
    Zip,
    /// PDF document (`%PDF`).
    Pdf,
    /// Nothing recognized; format-agnostic stages still apply.
    Unknown,
}

impl SampleFormat {
    /// Sniffs the format from the first bytes of a buffer.
    #[must_use]
    pub fn detect(bytes: &[u8]) -> Self {
        if bytes.starts_with(b"MZ") {
            Self::Pe
        } else if bytes.starts_with(b"\x7fELF") {
            Self::Elf
        } else if bytes.starts_with(b"PK\x03\x04") {
            Self::Zip
        } else if bytes.starts_with(b"%PDF") {
            Self::Pdf
        } else {
            Self::Unknown
        }
    }

    /// Returns true for recognized executable images.
    #[must_use]
    pub const fn is_executable(self) -> bool {
        matches!(self, Self::Pe | Self::Elf)
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pe => write!(f, "pe"),
            Self::Elf => write!(f, "elf"),
            Self::Zip => write!(f, "zip"),
            Self::Pdf => write!(f, "pdf"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Lightweight facts about a sample, available before any stage runs.
///
/// Applicability predicates are evaluated against this.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleMetadata {
    /// Content address of the sample.
    pub handle: SampleHandle,
    /// Sample size in bytes.
    pub size: u64,
    /// Sniffed container format.
    pub format: SampleFormat,
}

impl SampleMetadata {
    /// Builds metadata for fetched sample content.
    #[must_use]
    pub fn from_content(handle: SampleHandle, bytes: &[u8]) -> Self {
        Self {
            handle,
            size: bytes.len() as u64,
            format: SampleFormat::detect(bytes),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_is_sha256_hex() {
        let handle = SampleHandle::from_bytes(b"hello");
        assert_eq!(
            handle.as_str(),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_handle_content_addressed() {
        assert_eq!(
            SampleHandle::from_bytes(b"same"),
            SampleHandle::from_bytes(b"same")
        );
        assert_ne!(
            SampleHandle::from_bytes(b"one"),
            SampleHandle::from_bytes(b"two")
        );
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(SampleFormat::detect(b"MZ\x90\x00"), SampleFormat::Pe);
        assert_eq!(SampleFormat::detect(b"\x7fELF\x02\x01"), SampleFormat::Elf);
        assert_eq!(SampleFormat::detect(b"PK\x03\x04rest"), SampleFormat::Zip);
        assert_eq!(SampleFormat::detect(b"%PDF-1.7"), SampleFormat::Pdf);
        assert_eq!(SampleFormat::detect(b"plain text"), SampleFormat::Unknown);
        assert_eq!(SampleFormat::detect(b""), SampleFormat::Unknown);
    }

    #[test]
    fn test_executable_formats() {
        assert!(SampleFormat::Pe.is_executable());
        assert!(SampleFormat::Elf.is_executable());
        assert!(!SampleFormat::Zip.is_executable());
        assert!(!SampleFormat::Unknown.is_executable());
    }

    #[test]
    fn test_metadata_from_content() {
        let bytes = b"MZ\x90\x00padding";
        let meta = SampleMetadata::from_content(SampleHandle::from_bytes(bytes), bytes);
        assert_eq!(meta.size, bytes.len() as u64);
        assert_eq!(meta.format, SampleFormat::Pe);
    }
}

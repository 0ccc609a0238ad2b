//! Module registry: the ordered set of pluggable stages.
//!
//! Populated once before scheduling begins and read-only afterwards, so
//! concurrent readers need no synchronization.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::core::SampleMetadata;
use crate::errors::DuplicateStageError;
use crate::stages::{
    ExecutableHeaderStage, HashStage, IdentifyStage, JsonDumpStage, SignatureStage, Stage,
    StringsStage, SummaryStage,
};

/// Whether a stage analyzes the sample or renders the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StageCategory {
    /// Runs first, produces accumulator fields.
    Analysis,
    /// Runs over the finalized accumulator, produces report sections.
    Reporting,
}

impl fmt::Display for StageCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Analysis => write!(f, "analysis"),
            Self::Reporting => write!(f, "reporting"),
        }
    }
}

/// Condition deciding whether a stage runs for a given sample.
#[derive(Clone)]
pub enum Applicability {
    /// The stage always applies.
    Always,
    /// Predicate over sample metadata, evaluated when stages are listed.
    Metadata(Arc<dyn Fn(&SampleMetadata) -> bool + Send + Sync>),
    /// The stage needs a field an earlier stage produces; checked by the
    /// driver against the live accumulator just before the stage runs.
    RequiresField(String),
}

impl Applicability {
    /// Applies only to recognized executable images (PE/ELF).
    #[must_use]
    pub fn recognized_executable() -> Self {
        Self::Metadata(Arc::new(|meta| meta.format.is_executable()))
    }

    /// Applies only once the named field exists in the accumulator.
    #[must_use]
    pub fn requires_field(key: impl Into<String>) -> Self {
        Self::RequiresField(key.into())
    }

    /// Evaluates the metadata-level part of the predicate.
    ///
    /// `RequiresField` cannot be decided from metadata alone and is admitted
    /// here; the driver performs the deferred check.
    #[must_use]
    pub fn admits_metadata(&self, meta: &SampleMetadata) -> bool {
        match self {
            Self::Always | Self::RequiresField(_) => true,
            Self::Metadata(predicate) => predicate(meta),
        }
    }

    /// The field key the driver must check before running, if any.
    #[must_use]
    pub fn deferred_field(&self) -> Option<&str> {
        match self {
            Self::RequiresField(key) => Some(key),
            _ => None,
        }
    }
}

impl fmt::Debug for Applicability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Always => write!(f, "Always"),
            Self::Metadata(_) => write!(f, "Metadata(..)"),
            Self::RequiresField(key) => write!(f, "RequiresField({key:?})"),
        }
    }
}

/// Static description of one registered stage.
#[derive(Debug, Clone)]
pub struct StageDescriptor {
    /// Unique stage name.
    pub name: String,
    /// Analysis or reporting.
    pub category: StageCategory,
    /// Ordering rank within the category, ascending.
    pub rank: u32,
    /// Per-invocation time budget.
    pub timeout: Duration,
    /// When the stage applies.
    pub applicability: Applicability,
}

impl StageDescriptor {
    const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    /// Creates an always-applicable analysis descriptor.
    #[must_use]
    pub fn analysis(name: impl Into<String>, rank: u32) -> Self {
        Self {
            name: name.into(),
            category: StageCategory::Analysis,
            rank,
            timeout: Self::DEFAULT_TIMEOUT,
            applicability: Applicability::Always,
        }
    }

    /// Creates an always-applicable reporting descriptor.
    #[must_use]
    pub fn reporting(name: impl Into<String>, rank: u32) -> Self {
        Self {
            name: name.into(),
            category: StageCategory::Reporting,
            rank,
            timeout: Self::DEFAULT_TIMEOUT,
            applicability: Applicability::Always,
        }
    }

    /// Sets the time budget.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the applicability predicate.
    #[must_use]
    pub fn with_applicability(mut self, applicability: Applicability) -> Self {
        self.applicability = applicability;
        self
    }
}

/// A descriptor paired with its stage implementation.
#[derive(Debug, Clone)]
pub struct RegisteredStage {
    /// The static description.
    pub descriptor: StageDescriptor,
    /// The stage implementation.
    pub stage: Arc<dyn Stage>,
}

/// Holds the ordered set of pluggable stages.
#[derive(Debug, Default)]
pub struct ModuleRegistry {
    stages: Vec<RegisteredStage>,
    names: HashSet<String>,
}

impl ModuleRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a stage.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateStageError` if the name is already registered.
    pub fn register(
        &mut self,
        descriptor: StageDescriptor,
        stage: Arc<dyn Stage>,
    ) -> Result<(), DuplicateStageError> {
        if !self.names.insert(descriptor.name.clone()) {
            return Err(DuplicateStageError::new(descriptor.name));
        }
        self.stages.push(RegisteredStage { descriptor, stage });
        Ok(())
    }

    /// Returns the stages applicable to a sample, analysis first then
    /// reporting, each in ascending rank order (registration order breaks
    /// ties via stable sort).
    #[must_use]
    pub fn ordered_stages(&self, metadata: &SampleMetadata) -> Vec<RegisteredStage> {
        let mut selected: Vec<RegisteredStage> = self
            .stages
            .iter()
            .filter(|r| r.descriptor.applicability.admits_metadata(metadata))
            .cloned()
            .collect();
        selected.sort_by_key(|r| (r.descriptor.category, r.descriptor.rank));
        selected
    }

    /// Returns true if a stage with this name is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Number of registered stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

/// Builds the registry of built-in stages.
///
/// # Errors
///
/// Returns `DuplicateStageError` if a built-in name is somehow reused.
pub fn default_registry() -> Result<ModuleRegistry, DuplicateStageError> {
    let mut registry = ModuleRegistry::new();

    registry.register(
        StageDescriptor::analysis("identify", 0),
        Arc::new(IdentifyStage::default()),
    )?;
    registry.register(
        StageDescriptor::analysis("hashes", 10),
        Arc::new(HashStage),
    )?;
    registry.register(
        StageDescriptor::analysis("strings", 20),
        Arc::new(StringsStage::default()),
    )?;
    registry.register(
        StageDescriptor::analysis("exe_header", 30)
            .with_applicability(Applicability::recognized_executable()),
        Arc::new(ExecutableHeaderStage),
    )?;
    registry.register(
        StageDescriptor::analysis("signatures", 40)
            .with_applicability(Applicability::requires_field("strings.ascii")),
        Arc::new(SignatureStage::with_default_rules()),
    )?;
    registry.register(
        StageDescriptor::reporting("summary", 0),
        Arc::new(SummaryStage),
    )?;
    registry.register(
        StageDescriptor::reporting("jsondump", 10),
        Arc::new(JsonDumpStage),
    )?;

    Ok(registry)
}

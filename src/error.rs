//! Error and warning types for rust_edger

use serde::Serialize;
use thiserror::Error;

/// Main error type for differential expression runs
#[derive(Error, Debug)]
pub enum EdgerError {
    #[error("Invalid count matrix: {reason}")]
    InvalidCountMatrix { reason: String },

    #[error("Invalid design matrix: {reason}")]
    InvalidDesignMatrix { reason: String },

    #[error("Invalid metadata: {reason}")]
    InvalidMetadata { reason: String },

    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: String, got: String },

    #[error("Sample mismatch between count table and design: {reason}")]
    SampleMismatch { reason: String },

    #[error("Empty data: {reason}")]
    EmptyData { reason: String },

    #[error("Invalid contrast specification: {reason}")]
    InvalidContrast { reason: String },

    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Coarse error classes used when reporting a failed run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Malformed input data
    Validation,
    /// Bad parameters or contrast
    Configuration,
    /// Reading or writing files
    Io,
}

impl EdgerError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            EdgerError::InvalidCountMatrix { .. }
            | EdgerError::InvalidDesignMatrix { .. }
            | EdgerError::InvalidMetadata { .. }
            | EdgerError::DimensionMismatch { .. }
            | EdgerError::SampleMismatch { .. }
            | EdgerError::EmptyData { .. } => ErrorCategory::Validation,
            EdgerError::InvalidContrast { .. } | EdgerError::InvalidConfig { .. } => {
                ErrorCategory::Configuration
            }
            EdgerError::IoError(_) | EdgerError::CsvError(_) | EdgerError::JsonError(_) => {
                ErrorCategory::Io
            }
        }
    }
}

/// Result type alias for rust_edger operations
pub type Result<T> = std::result::Result<T, EdgerError>;

/// Pipeline stage that produced a per-gene warning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    CommonDispersion,
    GeneDispersion,
    TrendedDispersion,
    TagwiseDispersion,
    FullModelFit,
    NullModelFit,
}

/// What went wrong for a single gene
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WarningKind {
    /// Optimizer ran out of iterations before meeting its tolerance
    Convergence { iterations: usize },
    /// Estimate was out of range and has been clamped
    Numerical { value: f64, clamped_to: f64 },
}

/// A non-fatal per-gene problem. The gene's result is kept but less reliable.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneWarning {
    pub gene_id: String,
    pub stage: Stage,
    #[serde(flatten)]
    pub kind: WarningKind,
}

impl GeneWarning {
    pub fn convergence(gene_id: &str, stage: Stage, iterations: usize) -> Self {
        Self {
            gene_id: gene_id.to_string(),
            stage,
            kind: WarningKind::Convergence { iterations },
        }
    }

    pub fn numerical(gene_id: &str, stage: Stage, value: f64, clamped_to: f64) -> Self {
        Self {
            gene_id: gene_id.to_string(),
            stage,
            kind: WarningKind::Numerical { value, clamped_to },
        }
    }

    pub fn is_convergence(&self) -> bool {
        matches!(self.kind, WarningKind::Convergence { .. })
    }
}

/// Aggregated per-gene warnings for a run, in the order they were raised
#[derive(Debug, Clone, Default, Serialize)]
pub struct WarningLog {
    warnings: Vec<GeneWarning>,
}

impl WarningLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, warning: GeneWarning) {
        log::debug!("gene {} ({:?}): {:?}", warning.gene_id, warning.stage, warning.kind);
        self.warnings.push(warning);
    }

    pub fn extend<I: IntoIterator<Item = GeneWarning>>(&mut self, warnings: I) {
        for w in warnings {
            self.push(w);
        }
    }

    pub fn warnings(&self) -> &[GeneWarning] {
        &self.warnings
    }

    pub fn len(&self) -> usize {
        self.warnings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.warnings.is_empty()
    }

    /// Identifiers of genes with at least one warning, deduplicated, first-seen order
    pub fn flagged_genes(&self) -> Vec<&str> {
        let mut seen = std::collections::HashSet::new();
        self.warnings
            .iter()
            .filter(|w| seen.insert(w.gene_id.as_str()))
            .map(|w| w.gene_id.as_str())
            .collect()
    }

    /// Convergence and numerical warning counts for one stage
    pub fn kind_counts(&self, stage: Stage) -> (usize, usize) {
        let (convergence, numerical): (Vec<_>, Vec<_>) = self
            .warnings
            .iter()
            .filter(|w| w.stage == stage)
            .partition(|w| w.is_convergence());
        (convergence.len(), numerical.len())
    }

    /// Emit one summary line per stage at warn level
    pub fn log_summary(&self) {
        for stage in [
            Stage::CommonDispersion,
            Stage::GeneDispersion,
            Stage::TrendedDispersion,
            Stage::TagwiseDispersion,
            Stage::FullModelFit,
            Stage::NullModelFit,
        ] {
            let (convergence, numerical) = self.kind_counts(stage);
            if convergence + numerical > 0 {
                log::warn!(
                    "{:?}: {} convergence and {} numerical gene warning(s)",
                    stage,
                    convergence,
                    numerical
                );
            }
        }
    }
}

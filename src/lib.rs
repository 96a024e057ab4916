//! rust_edger: negative binomial GLM differential expression for RNA-seq
//!
//! The analysis filters lowly expressed genes, normalizes library sizes by
//! TMM, estimates common, trended and tagwise dispersions by Cox-Reid
//! adjusted profile likelihood with empirical Bayes shrinkage, fits a
//! negative binomial GLM per gene and tests a contrast by likelihood ratio,
//! reporting Benjamini-Hochberg FDR.
//!
//! # Example
//!
//! ```ignore
//! use rust_edger::prelude::*;
//!
//! let counts = read_count_matrix("counts.tsv")?;
//! let samples = read_sample_table("samples.tsv")?;
//! let design = encode_factors(&samples, &["group".to_string()], &Default::default())?;
//!
//! let analysis = run_pipeline(
//!     &counts,
//!     &design,
//!     &Default::default(),
//!     &ContrastSpec::Coefficient(1),
//!     &PipelineConfig::default(),
//! )?;
//! write_results("results.tsv", &analysis.results)?;
//! ```

pub mod annotation;
pub mod cli;
pub mod config;
pub mod data;
pub mod dispersion;
pub mod error;
pub mod filter;
pub mod glm;
pub mod io;
pub mod normalization;
pub mod parallel;
pub mod pipeline;
pub mod stats;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::annotation::{Annotation, AnnotationSource, TableAnnotations};
    pub use crate::config::PipelineConfig;
    pub use crate::data::{encode_factors, CountMatrix, SampleDesign, SampleTable};
    pub use crate::dispersion::{estimate_dispersions, DispersionEstimate, DispersionParams};
    pub use crate::error::{EdgerError, ErrorCategory, GeneWarning, Result, WarningLog};
    pub use crate::filter::{filter_by_expression, FilterParams, FilteredCounts};
    pub use crate::glm::{fit_glm, GlmFit, GlmFitParams};
    pub use crate::io::{
        read_count_matrix, read_design_matrix, read_gene_list, read_sample_table,
        write_dispersions, write_matrix, write_report, write_results, RankedResult, ResultRow,
        RunReport,
    };
    pub use crate::normalization::{ave_log_cpm, cpm, log_cpm, tmm_factors, NormalizationFactors, TmmParams};
    pub use crate::parallel::GeneExecutor;
    pub use crate::pipeline::{normalize, run_pipeline, Analysis, Normalized};
    pub use crate::testing::{benjamini_hochberg, likelihood_ratio_test, rank_results, ContrastSpec};
}

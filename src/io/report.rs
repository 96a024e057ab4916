//! JSON run report

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use serde::Serialize;

use crate::config::PipelineConfig;
use crate::error::{GeneWarning, Result};
use crate::normalization::NormalizationFactors;

/// What a run did, for provenance next to the results table
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub version: String,
    pub config: PipelineConfig,
    pub contrast: String,
    pub genes_input: usize,
    pub genes_excluded: usize,
    pub genes_low_expression: usize,
    pub genes_tested: usize,
    pub normalization: NormalizationFactors,
    pub common_dispersion: f64,
    pub prior_df: f64,
    pub prior_var: f64,
    pub significant: usize,
    pub warnings: Vec<GeneWarning>,
}

pub fn write_report<P: AsRef<Path>>(path: P, report: &RunReport) -> Result<()> {
    let writer = BufWriter::new(File::create(path.as_ref())?);
    serde_json::to_writer_pretty(writer, report)?;
    log::info!("Wrote run report to {}", path.as_ref().display());
    Ok(())
}

//! Expression filtering on log2-CPM
//!
//! Genes named in an exclusion set are removed first. Library sizes are then
//! taken over the remaining genes, and a gene is kept when at least
//! `min_samples` samples reach `min_log_cpm`.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::data::CountMatrix;
use crate::error::{EdgerError, Result};
use crate::normalization::log_cpm;

/// Filtering thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterParams {
    /// Minimum log2-CPM a sample must reach
    pub min_log_cpm: f64,
    /// Number of samples that must reach the threshold
    pub min_samples: usize,
    /// Prior count added before taking logs (0 = plain log2 CPM)
    pub prior_count: f64,
}

impl Default for FilterParams {
    fn default() -> Self {
        Self {
            min_log_cpm: 0.0,
            min_samples: 2,
            prior_count: 0.0,
        }
    }
}

impl FilterParams {
    pub fn validate(&self, n_samples: usize) -> Result<()> {
        if self.min_samples > n_samples {
            return Err(EdgerError::InvalidConfig {
                reason: format!(
                    "min_samples ({}) exceeds the number of samples ({})",
                    self.min_samples, n_samples
                ),
            });
        }
        if !self.min_log_cpm.is_finite() {
            return Err(EdgerError::InvalidConfig {
                reason: format!("min_log_cpm must be finite, got {}", self.min_log_cpm),
            });
        }
        if !(self.prior_count >= 0.0 && self.prior_count.is_finite()) {
            return Err(EdgerError::InvalidConfig {
                reason: format!("prior_count must be non-negative, got {}", self.prior_count),
            });
        }
        Ok(())
    }
}

/// Output of the filter stage
#[derive(Debug, Clone, PartialEq)]
pub struct FilteredCounts {
    /// Retained genes in input order
    pub counts: CountMatrix,
    /// Column sums over retained genes
    pub library_sizes: Vec<f64>,
    /// Genes removed by the exclusion set
    pub excluded: Vec<String>,
    /// Genes removed for low expression
    pub low_expression: Vec<String>,
}

impl FilteredCounts {
    pub fn n_genes(&self) -> usize {
        self.counts.n_genes()
    }
}

fn positive_library_sizes(counts: &CountMatrix, when: &str) -> Result<Vec<f64>> {
    let libs = counts.library_sizes().to_vec();
    if let Some(j) = libs.iter().position(|&l| l <= 0.0) {
        return Err(EdgerError::InvalidCountMatrix {
            reason: format!(
                "sample '{}' has no counts {}",
                counts.sample_ids()[j],
                when
            ),
        });
    }
    Ok(libs)
}

/// Remove excluded and lowly expressed genes
pub fn filter_by_expression(
    counts: &CountMatrix,
    exclude: &HashSet<String>,
    params: &FilterParams,
) -> Result<FilteredCounts> {
    params.validate(counts.n_samples())?;

    for id in exclude {
        if counts.gene_index(id).is_none() {
            log::debug!("Excluded gene '{}' is not in the count table", id);
        }
    }

    let (kept, excluded): (Vec<usize>, Vec<usize>) =
        (0..counts.n_genes()).partition(|&i| !exclude.contains(&counts.gene_ids()[i]));
    let excluded: Vec<String> = excluded
        .into_iter()
        .map(|i| counts.gene_ids()[i].clone())
        .collect();
    if kept.is_empty() {
        return Err(EdgerError::EmptyData {
            reason: "every gene is in the exclusion set".to_string(),
        });
    }
    let remaining = counts.subset_genes(&kept)?;
    let libs = positive_library_sizes(&remaining, "after applying the exclusion set")?;

    let lcpm = log_cpm(remaining.counts(), &libs, params.prior_count)?;
    let (pass, low): (Vec<usize>, Vec<usize>) = (0..remaining.n_genes()).partition(|&i| {
        lcpm.row(i).iter().filter(|&&v| v >= params.min_log_cpm).count() >= params.min_samples
    });

    if pass.is_empty() {
        return Err(EdgerError::EmptyData {
            reason: format!(
                "no gene reaches log2 CPM {} in {} samples",
                params.min_log_cpm, params.min_samples
            ),
        });
    }

    let low_expression: Vec<String> = low
        .into_iter()
        .map(|i| remaining.gene_ids()[i].clone())
        .collect();
    let retained = remaining.subset_genes(&pass)?;
    let library_sizes = positive_library_sizes(&retained, "among retained genes")?;

    log::info!(
        "Filtering: {} genes kept, {} excluded, {} below expression threshold",
        retained.n_genes(),
        excluded.len(),
        low_expression.len()
    );

    Ok(FilteredCounts {
        counts: retained,
        library_sizes,
        excluded,
        low_expression,
    })
}

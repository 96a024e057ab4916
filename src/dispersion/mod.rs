//! Dispersion estimation for negative binomial models
//!
//! Estimates run in order: one common dispersion for all genes, raw
//! per-gene maximizers of the Cox-Reid adjusted profile likelihood, an
//! abundance trend through the raw values, and finally tagwise values
//! shrunk from raw towards the trend by an empirical Bayes prior.

mod cox_reid;
mod optimize;
mod tagwise;
mod trend;

pub use cox_reid::{adjusted_profile_loglik, ProfilePoint};
pub use optimize::{golden_section_max, grid_golden_max, Maximum};
pub use tagwise::{estimate_prior, tagwise_dispersion, DispersionPrior};
pub use trend::{default_trend_span, fit_dispersion_trend};

use serde::{Deserialize, Serialize};

use crate::data::{CountMatrix, SampleDesign};
use crate::error::{EdgerError, GeneWarning, Result, Stage};
use crate::glm::GlmFitParams;
use crate::normalization::{ave_log_cpm, NormalizationFactors, AVE_LOG_CPM_PRIOR};
use crate::parallel::GeneExecutor;

/// Configurable parameters for dispersion estimation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispersionParams {
    /// Lower bound of the dispersion search
    pub min_disp: f64,
    /// Upper bound of the dispersion search, raised to the sample count if smaller
    pub max_disp: f64,
    /// Width of the final log-dispersion bracket
    pub tol: f64,
    /// Maximum golden-section iterations per search
    pub max_iter: usize,
    /// Grid points used to bracket the maximum
    pub grid_points: usize,
    /// Trend smoothing span; None picks one from the gene count
    pub trend_span: Option<f64>,
    /// Floor on the prior variance of log dispersion
    pub min_prior_var: f64,
}

impl Default for DispersionParams {
    fn default() -> Self {
        Self {
            min_disp: 1e-8,
            max_disp: 10.0,
            tol: 1e-6,
            max_iter: 100,
            grid_points: 11,
            trend_span: None,
            min_prior_var: 0.25,
        }
    }
}

impl DispersionParams {
    pub fn validate(&self) -> Result<()> {
        if !(self.min_disp > 0.0 && self.min_disp < self.max_disp) {
            return Err(EdgerError::InvalidConfig {
                reason: format!(
                    "dispersion bounds must satisfy 0 < min_disp < max_disp, got {} and {}",
                    self.min_disp, self.max_disp
                ),
            });
        }
        if let Some(span) = self.trend_span {
            if !(span > 0.0 && span <= 1.0) {
                return Err(EdgerError::InvalidConfig {
                    reason: format!("trend_span must be in (0, 1], got {}", span),
                });
            }
        }
        if !(self.tol > 0.0) || self.min_prior_var <= 0.0 {
            return Err(EdgerError::InvalidConfig {
                reason: "tol and min_prior_var must be positive".to_string(),
            });
        }
        Ok(())
    }

    /// Search interval on the log scale
    fn log_bounds(&self, n_samples: usize) -> (f64, f64) {
        (self.min_disp.ln(), self.max_disp.max(n_samples as f64).ln())
    }
}

/// All dispersion estimates for one analysis
#[derive(Debug, Clone, Serialize)]
pub struct DispersionEstimate {
    pub gene_ids: Vec<String>,
    pub common: f64,
    /// Per-gene maximizers of the adjusted profile likelihood
    pub raw: Vec<f64>,
    pub trended: Vec<f64>,
    /// Shrunk per-gene values used for testing
    pub tagwise: Vec<f64>,
    pub ave_log_cpm: Vec<f64>,
    pub prior_var: f64,
    pub prior_df: f64,
    pub residual_df: usize,
    pub warnings: Vec<GeneWarning>,
}

/// Replace a non-finite or non-positive estimate by `min_disp`
fn checked_dispersion(
    value: f64,
    gene_id: &str,
    stage: Stage,
    min_disp: f64,
    warnings: &mut Vec<GeneWarning>,
) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        warnings.push(GeneWarning::numerical(gene_id, stage, value, min_disp));
        min_disp
    }
}

/// Relative slack below `min_disp` absorbed without a warning, so a trend
/// through genes sitting on the floor does not flag them all
const TREND_FLOOR_SLACK: f64 = 1e-9;

/// Floor trended values at `min_disp`, recording each clamp
fn floor_trend(
    trended: Vec<f64>,
    gene_ids: &[String],
    min_disp: f64,
    warnings: &mut Vec<GeneWarning>,
) -> Vec<f64> {
    trended
        .into_iter()
        .zip(gene_ids.iter())
        .map(|(value, id)| {
            if value.is_finite() && value >= min_disp {
                value
            } else if value.is_finite() && value >= min_disp * (1.0 - TREND_FLOOR_SLACK) {
                min_disp
            } else {
                warnings.push(GeneWarning::numerical(id, Stage::TrendedDispersion, value, min_disp));
                min_disp
            }
        })
        .collect()
}

/// Maximize the adjusted profile likelihood summed over genes.
/// Per-gene terms are computed in parallel and summed in gene order.
pub fn common_dispersion(
    counts: &CountMatrix,
    design: &SampleDesign,
    log_offsets: &[f64],
    params: &DispersionParams,
    glm_params: &GlmFitParams,
    executor: &GeneExecutor,
) -> Maximum {
    let x = design.matrix();
    let (lo, hi) = params.log_bounds(counts.n_samples());

    let best = grid_golden_max(
        |log_phi| {
            let phi = log_phi.exp();
            let terms = executor.map_genes(counts.n_genes(), |i| {
                adjusted_profile_loglik(counts.gene_counts(i), x, log_offsets, phi, None, glm_params)
                    .apl
            });
            terms.iter().sum()
        },
        lo,
        hi,
        params.grid_points,
        params.tol,
        params.max_iter,
    );
    if !best.converged {
        log::warn!(
            "Common dispersion search stopped after {} iterations",
            best.iterations
        );
    }
    best
}

/// Maximize each gene's adjusted profile likelihood independently
pub fn gene_dispersions(
    counts: &CountMatrix,
    design: &SampleDesign,
    log_offsets: &[f64],
    params: &DispersionParams,
    glm_params: &GlmFitParams,
    executor: &GeneExecutor,
) -> Vec<Maximum> {
    let x = design.matrix();
    let (lo, hi) = params.log_bounds(counts.n_samples());

    executor.map_genes(counts.n_genes(), |i| {
        let y = counts.gene_counts(i);
        let mut warm: Option<Vec<f64>> = None;
        grid_golden_max(
            |log_phi| {
                let point =
                    adjusted_profile_loglik(y, x, log_offsets, log_phi.exp(), warm.as_deref(), glm_params);
                warm = Some(point.coefficients);
                point.apl
            },
            lo,
            hi,
            params.grid_points,
            params.tol,
            params.max_iter,
        )
    })
}

/// Estimate common, raw, trended and tagwise dispersions
pub fn estimate_dispersions(
    counts: &CountMatrix,
    design: &SampleDesign,
    norm: &NormalizationFactors,
    params: &DispersionParams,
    glm_params: &GlmFitParams,
    executor: &GeneExecutor,
) -> Result<DispersionEstimate> {
    params.validate()?;
    if design.n_samples() != counts.n_samples() {
        return Err(EdgerError::DimensionMismatch {
            expected: format!("{} design rows", counts.n_samples()),
            got: format!("{} design rows", design.n_samples()),
        });
    }
    let residual_df = design.residual_df();
    if residual_df == 0 {
        return Err(EdgerError::InvalidDesignMatrix {
            reason: format!(
                "{} samples and {} coefficients leave no residual degrees of freedom for dispersion estimation",
                design.n_samples(),
                design.n_coefs()
            ),
        });
    }

    let gene_ids = counts.gene_ids();
    let log_offsets = norm.log_offsets();
    let ave = ave_log_cpm(counts.counts(), &norm.effective_library_sizes(), AVE_LOG_CPM_PRIOR)?;
    let mut warnings = Vec::new();

    // Step 1: common dispersion
    let common_fit = common_dispersion(counts, design, &log_offsets, params, glm_params, executor);
    let common = common_fit.argmax.exp();
    log::info!("Common dispersion: {:.6} (BCV {:.4})", common, common.sqrt());

    // Step 2: raw gene-wise dispersions
    let raw_fits = gene_dispersions(counts, design, &log_offsets, params, glm_params, executor);
    let raw: Vec<f64> = raw_fits
        .iter()
        .zip(gene_ids.iter())
        .map(|(fit, id)| {
            if !fit.converged {
                warnings.push(GeneWarning::convergence(id, Stage::GeneDispersion, fit.iterations));
            }
            checked_dispersion(fit.argmax.exp(), id, Stage::GeneDispersion, params.min_disp, &mut warnings)
        })
        .collect();

    // Step 3: abundance trend
    let span = params
        .trend_span
        .unwrap_or_else(|| default_trend_span(counts.n_genes()));
    let trended = floor_trend(
        fit_dispersion_trend(&ave, &raw, span, params.min_disp),
        gene_ids,
        params.min_disp,
        &mut warnings,
    );

    // Step 4: empirical Bayes shrinkage
    let prior = estimate_prior(&raw, &trended, residual_df, params);
    let bounds = params.log_bounds(counts.n_samples());
    let x = design.matrix();
    let tagwise_fits = executor.map_genes(counts.n_genes(), |i| {
        tagwise_dispersion(
            counts.gene_counts(i),
            x,
            &log_offsets,
            raw[i],
            trended[i],
            &prior,
            bounds,
            params,
            glm_params,
        )
    });
    let tagwise: Vec<f64> = tagwise_fits
        .into_iter()
        .zip(gene_ids.iter())
        .map(|((value, fit), id)| {
            if !fit.converged {
                warnings.push(GeneWarning::convergence(id, Stage::TagwiseDispersion, fit.iterations));
            }
            checked_dispersion(value, id, Stage::TagwiseDispersion, params.min_disp, &mut warnings)
        })
        .collect();

    log::info!(
        "Tagwise dispersions: prior variance {:.4}, prior df {:.3}",
        prior.variance,
        prior.df
    );

    Ok(DispersionEstimate {
        gene_ids: gene_ids.to_vec(),
        common,
        raw,
        trended,
        tagwise,
        ave_log_cpm: ave,
        prior_var: prior.variance,
        prior_df: prior.df,
        residual_df,
        warnings,
    })
}

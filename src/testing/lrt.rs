//! Likelihood ratio test of a contrast
//!
//! Algorithm:
//! 1. Resolve the contrast onto the retained design columns
//! 2. Build the null design satisfying c' beta = 0
//! 3. Refit every gene under the null design with its tagwise dispersion
//! 4. LR = max(deviance_null - deviance_full, 0)
//! 5. p-value = upper tail of chi-squared with df = rank of the contrast

use serde::Serialize;
use statrs::distribution::{ChiSquared, ContinuousCDF};

use super::contrast::{null_design, ContrastSpec};
use crate::data::{CountMatrix, SampleDesign};
use crate::error::{EdgerError, GeneWarning, Result, Stage};
use crate::glm::{fit_glm, GlmFit, GlmFitParams};
use crate::parallel::GeneExecutor;

/// Per-gene test statistics for one contrast, in gene order
#[derive(Debug, Clone, Serialize)]
pub struct ContrastResults {
    pub gene_ids: Vec<String>,
    pub contrast: String,
    /// log2 fold change, c' beta / ln 2
    pub log_fc: Vec<f64>,
    /// Average log2 CPM
    pub log_cpm: Vec<f64>,
    /// Likelihood ratio statistic
    pub lr: Vec<f64>,
    pub p_values: Vec<f64>,
    pub df: usize,
    /// False when either the full or the null fit did not converge
    pub converged: Vec<bool>,
    pub warnings: Vec<GeneWarning>,
}

impl ContrastResults {
    pub fn n_genes(&self) -> usize {
        self.gene_ids.len()
    }
}

/// Test `contrast` for every gene of a full-model fit
#[allow(clippy::too_many_arguments)]
pub fn likelihood_ratio_test(
    full: &GlmFit,
    counts: &CountMatrix,
    design: &SampleDesign,
    log_offsets: &[f64],
    ave_log_cpm: &[f64],
    contrast: &ContrastSpec,
    glm_params: &GlmFitParams,
    executor: &GeneExecutor,
) -> Result<ContrastResults> {
    let n_genes = counts.n_genes();
    if full.n_genes() != n_genes || ave_log_cpm.len() != n_genes {
        return Err(EdgerError::DimensionMismatch {
            expected: format!("{} genes", n_genes),
            got: format!("{} fitted, {} abundances", full.n_genes(), ave_log_cpm.len()),
        });
    }

    let resolved = contrast.resolve(design)?;
    log::info!("Testing contrast {}", resolved.label);

    if resolved.rank == 0 {
        log::warn!("Contrast is identically zero; every gene gets LR 0 and p-value 1");
        return Ok(ContrastResults {
            gene_ids: full.gene_ids.clone(),
            contrast: resolved.label,
            log_fc: vec![0.0; n_genes],
            log_cpm: ave_log_cpm.to_vec(),
            lr: vec![0.0; n_genes],
            p_values: vec![1.0; n_genes],
            df: 0,
            converged: full.converged.clone(),
            warnings: full.convergence_warnings(Stage::FullModelFit),
        });
    }

    let reduced = null_design(design.matrix(), &resolved);
    let null_fit = fit_glm(
        counts.counts(),
        counts.gene_ids(),
        reduced.view(),
        log_offsets,
        &full.dispersions,
        glm_params,
        executor,
    );

    let chi2 = ChiSquared::new(resolved.rank as f64).map_err(|e| EdgerError::InvalidContrast {
        reason: format!("invalid degrees of freedom {}: {}", resolved.rank, e),
    })?;

    let lr: Vec<f64> = null_fit
        .deviance
        .iter()
        .zip(full.deviance.iter())
        .map(|(&d0, &d1)| (d0 - d1).max(0.0))
        .collect();
    let p_values: Vec<f64> = lr
        .iter()
        .map(|&stat| if stat.is_finite() { chi2.sf(stat) } else { f64::NAN })
        .collect();

    let log_fc: Vec<f64> = full
        .coefficients
        .rows()
        .into_iter()
        .map(|beta| {
            beta.iter()
                .zip(resolved.weights.iter())
                .map(|(b, w)| b * w)
                .sum::<f64>()
                / std::f64::consts::LN_2
        })
        .collect();

    let mut warnings = full.convergence_warnings(Stage::FullModelFit);
    warnings.extend(null_fit.convergence_warnings(Stage::NullModelFit));
    let converged: Vec<bool> = full
        .converged
        .iter()
        .zip(null_fit.converged.iter())
        .map(|(&a, &b)| a && b)
        .collect();

    Ok(ContrastResults {
        gene_ids: full.gene_ids.clone(),
        contrast: resolved.label,
        log_fc,
        log_cpm: ave_log_cpm.to_vec(),
        lr,
        p_values,
        df: resolved.rank,
        converged,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};

    fn setup() -> (CountMatrix, SampleDesign, Vec<f64>) {
        let counts = CountMatrix::new(
            array![
                [100.0, 110.0, 95.0, 400.0, 390.0, 420.0],
                [200.0, 190.0, 210.0, 205.0, 195.0, 200.0]
            ],
            vec!["up".to_string(), "flat".to_string()],
            (1..=6).map(|i| format!("s{}", i)).collect(),
        )
        .unwrap();
        let mut x = Array2::zeros((6, 2));
        for i in 0..6 {
            x[[i, 0]] = 1.0;
            x[[i, 1]] = if i >= 3 { 1.0 } else { 0.0 };
        }
        let design = SampleDesign::new(
            x,
            vec!["(Intercept)".to_string(), "group".to_string()],
            counts.sample_ids().to_vec(),
        )
        .unwrap();
        (counts, design, vec![(1e4f64).ln(); 6])
    }

    fn full_fit(counts: &CountMatrix, design: &SampleDesign, offsets: &[f64], exec: &GeneExecutor) -> GlmFit {
        fit_glm(
            counts.counts(),
            counts.gene_ids(),
            design.matrix(),
            offsets,
            &[0.01, 0.01],
            &GlmFitParams::default(),
            exec,
        )
    }

    #[test]
    fn test_zero_contrast_gives_null_result() {
        let (counts, design, offsets) = setup();
        let exec = GeneExecutor::new(1).unwrap();
        let full = full_fit(&counts, &design, &offsets, &exec);
        let res = likelihood_ratio_test(
            &full,
            &counts,
            &design,
            &offsets,
            &[10.0, 10.0],
            &ContrastSpec::Vector(vec![0.0, 0.0]),
            &GlmFitParams::default(),
            &exec,
        )
        .unwrap();
        assert_eq!(res.lr, vec![0.0, 0.0]);
        assert_eq!(res.p_values, vec![1.0, 1.0]);
        assert_eq!(res.log_fc, vec![0.0, 0.0]);
    }

    #[test]
    fn test_zero_contrast_keeps_full_fit_warnings() {
        let (counts, design, offsets) = setup();
        let counts = CountMatrix::new(
            array![[0.0, 0.0, 0.0, 20.0, 25.0, 22.0]],
            vec!["silent_a".to_string()],
            counts.sample_ids().to_vec(),
        )
        .unwrap();
        let exec = GeneExecutor::new(1).unwrap();
        let params = GlmFitParams { max_iter: 10, ..Default::default() };
        let full = fit_glm(
            counts.counts(),
            counts.gene_ids(),
            design.matrix(),
            &offsets,
            &[0.1],
            &params,
            &exec,
        );
        assert_eq!(full.converged, vec![false]);

        let res = likelihood_ratio_test(
            &full,
            &counts,
            &design,
            &offsets,
            &[5.0],
            &ContrastSpec::Vector(vec![0.0, 0.0]),
            &params,
            &exec,
        )
        .unwrap();
        assert_eq!(res.converged, vec![false]);
        assert_eq!(res.warnings.len(), 1);
        assert_eq!(res.warnings[0].gene_id, "silent_a");
        assert_eq!(res.warnings[0].stage, Stage::FullModelFit);
        assert!(res.warnings[0].is_convergence());
    }

    #[test]
    fn test_shifted_gene_detected() {
        let (counts, design, offsets) = setup();
        let exec = GeneExecutor::new(2).unwrap();
        let full = full_fit(&counts, &design, &offsets, &exec);
        let res = likelihood_ratio_test(
            &full,
            &counts,
            &design,
            &offsets,
            &[10.0, 10.0],
            &ContrastSpec::Coefficient(1),
            &GlmFitParams::default(),
            &exec,
        )
        .unwrap();
        assert_eq!(res.df, 1);
        assert!(res.p_values[0] < 1e-6);
        assert!(res.p_values[1] > 0.5);
        let expected_lfc = ((400.0 + 390.0 + 420.0) / (100.0 + 110.0 + 95.0) as f64).log2();
        assert!((res.log_fc[0] - expected_lfc).abs() < 1e-4);
    }

    #[test]
    fn test_vector_and_coefficient_agree() {
        let (counts, design, offsets) = setup();
        let exec = GeneExecutor::new(1).unwrap();
        let full = full_fit(&counts, &design, &offsets, &exec);
        let run = |c: ContrastSpec| {
            likelihood_ratio_test(&full, &counts, &design, &offsets, &[10.0, 10.0], &c, &GlmFitParams::default(), &exec)
                .unwrap()
        };
        let by_coef = run(ContrastSpec::Coefficient(1));
        let by_vec = run(ContrastSpec::Vector(vec![0.0, 2.0]));
        for g in 0..2 {
            assert!((by_coef.lr[g] - by_vec.lr[g]).abs() < 1e-6 * (1.0 + by_coef.lr[g]));
        }
        assert!((by_vec.log_fc[0] - 2.0 * by_coef.log_fc[0]).abs() < 1e-9);
    }

    #[test]
    fn test_bad_contrast_is_configuration_error() {
        let (counts, design, offsets) = setup();
        let exec = GeneExecutor::new(1).unwrap();
        let full = full_fit(&counts, &design, &offsets, &exec);
        let err = likelihood_ratio_test(
            &full,
            &counts,
            &design,
            &offsets,
            &[10.0, 10.0],
            &ContrastSpec::Vector(vec![1.0]),
            &GlmFitParams::default(),
            &exec,
        )
        .unwrap_err();
        assert_eq!(err.category(), crate::error::ErrorCategory::Configuration);
    }
}

//! Stage orchestration
//!
//! Filter -> TMM -> dispersions -> full GLM -> LRT -> BH ranking. Each stage
//! takes the previous stage's output by reference and returns a new value.

use std::collections::HashSet;

use crate::config::PipelineConfig;
use crate::data::{CountMatrix, SampleDesign};
use crate::dispersion::{estimate_dispersions, DispersionEstimate};
use crate::error::{Result, WarningLog};
use crate::filter::{filter_by_expression, FilteredCounts};
use crate::glm::{fit_glm, GlmFit};
use crate::io::{RankedResult, RunReport};
use crate::normalization::{tmm_factors, NormalizationFactors};
use crate::parallel::GeneExecutor;
use crate::testing::{likelihood_ratio_test, rank_results, ContrastSpec};

/// Filtered counts with their TMM factors
#[derive(Debug, Clone)]
pub struct Normalized {
    pub filtered: FilteredCounts,
    pub normalization: NormalizationFactors,
}

/// Everything a completed run produced
#[derive(Debug, Clone)]
pub struct Analysis {
    pub genes_input: usize,
    pub filtered: FilteredCounts,
    pub design: SampleDesign,
    pub normalization: NormalizationFactors,
    pub dispersions: DispersionEstimate,
    pub fit: GlmFit,
    pub results: RankedResult,
    pub warnings: WarningLog,
}

impl Analysis {
    pub fn report(&self, config: &PipelineConfig) -> RunReport {
        RunReport {
            version: env!("CARGO_PKG_VERSION").to_string(),
            config: config.clone(),
            contrast: self.results.contrast.clone(),
            genes_input: self.genes_input,
            genes_excluded: self.filtered.excluded.len(),
            genes_low_expression: self.filtered.low_expression.len(),
            genes_tested: self.results.n_genes(),
            normalization: self.normalization.clone(),
            common_dispersion: self.dispersions.common,
            prior_df: self.dispersions.prior_df,
            prior_var: self.dispersions.prior_var,
            significant: self.results.significant(config.fdr_threshold).len(),
            warnings: self.warnings.warnings().to_vec(),
        }
    }
}

/// Filter and compute TMM factors
pub fn normalize(
    counts: &CountMatrix,
    exclude: &HashSet<String>,
    config: &PipelineConfig,
) -> Result<Normalized> {
    let nonzero = counts.drop_all_zero_genes()?;
    let mut filtered = filter_by_expression(&nonzero, exclude, &config.filter)?;
    if nonzero.n_genes() < counts.n_genes() {
        let kept: HashSet<&str> = nonzero.gene_ids().iter().map(String::as_str).collect();
        filtered.low_expression.extend(
            counts
                .gene_ids()
                .iter()
                .filter(|id| !kept.contains(id.as_str()))
                .cloned(),
        );
    }

    let normalization = tmm_factors(
        filtered.counts.counts(),
        &filtered.library_sizes,
        filtered.counts.sample_ids(),
        &config.tmm,
    )?;
    log::info!(
        "TMM factors: {}",
        normalization
            .factors
            .iter()
            .map(|f| format!("{:.4}", f))
            .collect::<Vec<_>>()
            .join(", ")
    );

    Ok(Normalized {
        filtered,
        normalization,
    })
}

/// Run the full differential expression analysis for one contrast
pub fn run_pipeline(
    counts: &CountMatrix,
    design: &SampleDesign,
    exclude: &HashSet<String>,
    contrast: &ContrastSpec,
    config: &PipelineConfig,
) -> Result<Analysis> {
    config.validate()?;
    let design = design.align_to(counts.sample_ids())?;
    // Fail on a bad contrast before any fitting
    contrast.resolve(&design)?;

    let executor = GeneExecutor::new(config.threads)?;
    log::info!(
        "Analysing {} genes x {} samples on {} threads",
        counts.n_genes(),
        counts.n_samples(),
        executor.threads()
    );

    let Normalized {
        filtered,
        normalization,
    } = normalize(counts, exclude, config)?;
    let filtered_counts = &filtered.counts;

    let dispersions = estimate_dispersions(
        filtered_counts,
        &design,
        &normalization,
        &config.dispersion,
        &config.glm,
        &executor,
    )?;

    let log_offsets = normalization.log_offsets();
    log::info!("Fitting full model for {} genes", filtered_counts.n_genes());
    let fit = fit_glm(
        filtered_counts.counts(),
        filtered_counts.gene_ids(),
        design.matrix(),
        &log_offsets,
        &dispersions.tagwise,
        &config.glm,
        &executor,
    );

    let tested = likelihood_ratio_test(
        &fit,
        filtered_counts,
        &design,
        &log_offsets,
        &dispersions.ave_log_cpm,
        contrast,
        &config.glm,
        &executor,
    )?;

    let mut warnings = WarningLog::new();
    warnings.extend(dispersions.warnings.iter().cloned());
    warnings.extend(tested.warnings.iter().cloned());
    warnings.log_summary();

    let mut results = rank_results(&tested);
    results.warnings = warnings.warnings().to_vec();
    log::info!(
        "{} of {} genes significant at FDR {}",
        results.significant(config.fdr_threshold).len(),
        results.n_genes(),
        config.fdr_threshold
    );

    Ok(Analysis {
        genes_input: counts.n_genes(),
        filtered,
        design,
        normalization,
        dispersions,
        fit,
        results,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{EdgerError, ErrorCategory};
    use crate::filter::FilterParams;
    use ndarray::{array, Array2};

    fn counts() -> CountMatrix {
        CountMatrix::new(
            array![
                [98.0, 105.0, 101.0, 395.0, 410.0, 402.0],
                [402.0, 396.0, 410.0, 99.0, 104.0, 97.0],
                [200.0, 208.0, 195.0, 203.0, 198.0, 205.0],
                [305.0, 298.0, 310.0, 300.0, 307.0, 296.0]
            ],
            vec!["up".into(), "down".into(), "flat1".into(), "flat2".into()],
            (1..=6).map(|i| format!("s{}", i)).collect(),
        )
        .unwrap()
    }

    fn design() -> SampleDesign {
        let mut x = Array2::zeros((6, 2));
        for i in 0..6 {
            x[[i, 0]] = 1.0;
            x[[i, 1]] = if i >= 3 { 1.0 } else { 0.0 };
        }
        SampleDesign::new(
            x,
            vec!["(Intercept)".to_string(), "treated".to_string()],
            (1..=6).map(|i| format!("s{}", i)).collect(),
        )
        .unwrap()
    }

    fn config(threads: usize) -> PipelineConfig {
        PipelineConfig {
            filter: FilterParams {
                min_log_cpm: 0.0,
                min_samples: 3,
                ..Default::default()
            },
            threads,
            ..Default::default()
        }
    }

    #[test]
    fn test_end_to_end_two_groups() {
        let analysis = run_pipeline(
            &counts(),
            &design(),
            &HashSet::new(),
            &ContrastSpec::Coefficient(1),
            &config(2),
        )
        .unwrap();
        let res = &analysis.results;
        assert_eq!(res.n_genes(), 4);

        let up = res.get("up").unwrap();
        let down = res.get("down").unwrap();
        assert!(up.fdr < 0.05 && up.log_fc > 1.5);
        assert!(down.fdr < 0.05 && down.log_fc < -1.5);
        assert!(res.get("flat1").unwrap().fdr > 0.05);
        assert!(res.get("flat2").unwrap().fdr > 0.05);

        let ids: Vec<&str> = res.rows.iter().take(2).map(|r| r.gene_id.as_str()).collect();
        assert!(ids.contains(&"up") && ids.contains(&"down"));

        let log_factors: f64 = analysis.normalization.factors.iter().map(|f| f.ln()).sum();
        assert!(log_factors.abs() < 1e-10);
    }

    #[test]
    fn test_normalize_reports_all_zero_genes() {
        let with_zero = CountMatrix::new(
            array![
                [98.0, 105.0, 101.0, 395.0, 410.0, 402.0],
                [0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
                [200.0, 208.0, 195.0, 203.0, 198.0, 205.0],
                [305.0, 298.0, 310.0, 300.0, 307.0, 296.0]
            ],
            vec!["up".into(), "silent".into(), "flat1".into(), "flat2".into()],
            (1..=6).map(|i| format!("s{}", i)).collect(),
        )
        .unwrap();
        let out = normalize(&with_zero, &HashSet::new(), &config(1)).unwrap();
        assert_eq!(out.filtered.n_genes(), 3);
        assert_eq!(out.filtered.low_expression, vec!["silent".to_string()]);
        assert_eq!(out.normalization.factors.len(), 6);
    }

    #[test]
    fn test_thread_count_does_not_change_results() {
        let run = |threads| {
            run_pipeline(
                &counts(),
                &design(),
                &HashSet::new(),
                &ContrastSpec::Vector(vec![0.0, 1.0]),
                &config(threads),
            )
            .unwrap()
        };
        let serial = run(1);
        let parallel = run(4);
        assert_eq!(serial.dispersions.common.to_bits(), parallel.dispersions.common.to_bits());
        assert_eq!(serial.dispersions.tagwise, parallel.dispersions.tagwise);
        assert_eq!(serial.results.rows, parallel.results.rows);
    }

    #[test]
    fn test_exclusion_and_design_reordering() {
        // Design rows in reverse sample order
        let d = design();
        let reversed: Vec<String> = d.sample_ids().iter().rev().cloned().collect();
        let d = d.align_to(&reversed).unwrap();
        let exclude: HashSet<String> = ["flat2".to_string()].into_iter().collect();

        let analysis = run_pipeline(
            &counts(),
            &d,
            &exclude,
            &ContrastSpec::Coefficient(1),
            &config(1),
        )
        .unwrap();
        assert_eq!(analysis.filtered.excluded, vec!["flat2".to_string()]);
        assert!(analysis.results.get("flat2").is_none());
        assert!(analysis.results.get("up").unwrap().log_fc > 1.5);
    }

    #[test]
    fn test_bad_contrast_aborts_before_fitting() {
        let err = run_pipeline(
            &counts(),
            &design(),
            &HashSet::new(),
            &ContrastSpec::Coefficient(5),
            &config(1),
        )
        .unwrap_err();
        assert!(matches!(err, EdgerError::InvalidContrast { .. }));
        assert_eq!(err.category(), ErrorCategory::Configuration);
    }

    #[test]
    fn test_report_serializes() {
        let cfg = config(1);
        let analysis = run_pipeline(
            &counts(),
            &design(),
            &HashSet::new(),
            &ContrastSpec::Coefficient(1),
            &cfg,
        )
        .unwrap();
        let file = tempfile::NamedTempFile::new().unwrap();
        crate::io::write_report(file.path(), &analysis.report(&cfg)).unwrap();

        let text = std::fs::read_to_string(file.path()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["genes_tested"], 4);
        assert_eq!(value["significant"], 2);
        assert_eq!(value["contrast"], "treated");
        assert!(value["common_dispersion"].as_f64().unwrap() > 0.0);
        assert_eq!(value["config"]["filter"]["min_samples"], 3);
    }
}

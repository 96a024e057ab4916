//! Multiple-testing correction and result ranking

use std::cmp::Ordering;

use super::lrt::ContrastResults;
use crate::io::{RankedResult, ResultRow};

/// NaN sorts after every finite value
fn cmp_nan_last(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}

/// Benjamini-Hochberg adjusted p-values.
///
/// NaN p-values stay NaN and do not count towards the number of tests.
pub fn benjamini_hochberg(pvalues: &[f64]) -> Vec<f64> {
    let n = pvalues.len();
    if n == 0 {
        return vec![];
    }

    let mut indices: Vec<usize> = (0..n).collect();
    indices.sort_by(|&a, &b| cmp_nan_last(pvalues[a], pvalues[b]));

    let m = pvalues.iter().filter(|p| !p.is_nan()).count();
    if m == 0 {
        return vec![f64::NAN; n];
    }

    let mut padj = vec![f64::NAN; n];
    let mut cummin = f64::INFINITY;
    let mut rank = m;

    for &i in indices.iter().rev() {
        let p = pvalues[i];
        if !p.is_nan() {
            let adj = (p * m as f64 / rank as f64).min(1.0);
            cummin = cummin.min(adj);
            padj[i] = cummin;
            rank -= 1;
        }
    }

    padj
}

/// Attach BH-adjusted FDR and sort by p-value, ties by gene identifier.
/// Symbol and description are left empty until annotated.
pub fn rank_results(results: &ContrastResults) -> RankedResult {
    let fdr = benjamini_hochberg(&results.p_values);

    let mut rows: Vec<ResultRow> = (0..results.n_genes())
        .map(|i| ResultRow {
            gene_id: results.gene_ids[i].clone(),
            log_fc: results.log_fc[i],
            log_cpm: results.log_cpm[i],
            lr: results.lr[i],
            p_value: results.p_values[i],
            fdr: fdr[i],
            converged: results.converged[i],
            symbol: String::new(),
            description: String::new(),
        })
        .collect();

    rows.sort_by(|a, b| {
        cmp_nan_last(a.p_value, b.p_value).then_with(|| a.gene_id.cmp(&b.gene_id))
    });

    RankedResult {
        contrast: results.contrast.clone(),
        rows,
        warnings: results.warnings.clone(),
    }
}

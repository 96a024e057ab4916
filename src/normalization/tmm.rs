//! Trimmed mean of M-values (TMM) normalization
//!
//! Each sample is compared with a reference sample over genes observed in
//! both. Genes with extreme log-ratios (M) or extreme average abundance (A)
//! are trimmed, and the precision-weighted mean of the remaining M-values
//! gives the sample's scaling factor. Factors are rescaled to have
//! geometric mean one.

use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};

use crate::error::{EdgerError, Result};
use crate::stats::quantile;

/// Parameters for TMM
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TmmParams {
    /// Fraction of M-values trimmed from each tail
    pub logratio_trim: f64,
    /// Fraction of A-values trimmed from each tail
    pub sum_trim: f64,
    /// Weight M-values by inverse asymptotic variance
    pub do_weighting: bool,
    /// Minimum genes surviving the trim; fewer falls back to factor 1
    pub min_trimmed_genes: usize,
}

impl Default for TmmParams {
    fn default() -> Self {
        Self {
            logratio_trim: 0.3,
            sum_trim: 0.05,
            do_weighting: true,
            min_trimmed_genes: 2,
        }
    }
}

impl TmmParams {
    pub fn validate(&self) -> Result<()> {
        for (name, v) in [("logratio_trim", self.logratio_trim), ("sum_trim", self.sum_trim)] {
            if !(0.0..0.5).contains(&v) {
                return Err(EdgerError::InvalidConfig {
                    reason: format!("{} must be in [0, 0.5), got {}", name, v),
                });
            }
        }
        Ok(())
    }
}

/// Per-sample normalization factors
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizationFactors {
    pub sample_ids: Vec<String>,
    /// Scaling factors, geometric mean one
    pub factors: Vec<f64>,
    /// Library sizes the factors were computed against
    pub library_sizes: Vec<f64>,
    /// Index of the reference sample
    pub reference_sample: usize,
    /// Samples that fell back to library-size-only scaling
    pub fallback_samples: Vec<usize>,
}

impl NormalizationFactors {
    /// Library size times normalization factor
    pub fn effective_library_sizes(&self) -> Vec<f64> {
        self.library_sizes
            .iter()
            .zip(self.factors.iter())
            .map(|(&n, &f)| n * f)
            .collect()
    }

    /// GLM offsets, log(N f)
    pub fn log_offsets(&self) -> Vec<f64> {
        self.effective_library_sizes().iter().map(|v| v.ln()).collect()
    }
}

/// Ranks with ties given their average rank (1-based)
fn average_ranks(x: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..x.len()).collect();
    order.sort_by(|&a, &b| x[a].total_cmp(&x[b]));
    let mut ranks = vec![0.0; x.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && x[order[j + 1]] == x[order[i]] {
            j += 1;
        }
        let avg = (i + j) as f64 / 2.0 + 1.0;
        for &k in &order[i..=j] {
            ranks[k] = avg;
        }
        i = j + 1;
    }
    ranks
}

/// Reference sample: upper quartile of count/library closest to the mean
/// upper quartile. Ties go to the lowest index.
fn reference_sample(counts: ArrayView2<f64>, lib_sizes: &[f64]) -> usize {
    let upper_quartiles: Vec<f64> = counts
        .columns()
        .into_iter()
        .zip(lib_sizes.iter())
        .map(|(col, &lib)| {
            let props: Vec<f64> = col.iter().map(|&y| y / lib).collect();
            quantile(&props, 0.75)
        })
        .collect();
    let mean_uq = upper_quartiles.iter().sum::<f64>() / upper_quartiles.len() as f64;

    let mut best = 0;
    for (j, uq) in upper_quartiles.iter().enumerate() {
        if (uq - mean_uq).abs() < (upper_quartiles[best] - mean_uq).abs() {
            best = j;
        }
    }
    best
}

/// Log2 factor of one sample against the reference; None when too few genes survive
fn sample_log_factor(
    obs: &[f64],
    reference: &[f64],
    n_obs: f64,
    n_ref: f64,
    params: &TmmParams,
) -> Option<f64> {
    let mut m = Vec::new();
    let mut a = Vec::new();
    let mut v = Vec::new();
    for (&yo, &yr) in obs.iter().zip(reference.iter()) {
        if yo <= 0.0 || yr <= 0.0 {
            continue;
        }
        let po = yo / n_obs;
        let pr = yr / n_ref;
        m.push((po / pr).log2());
        a.push((po.log2() + pr.log2()) / 2.0);
        v.push((n_obs - yo) / (n_obs * yo) + (n_ref - yr) / (n_ref * yr));
    }

    if m.is_empty() {
        return None;
    }
    if m.iter().all(|x| x.abs() < 1e-6) {
        return Some(0.0);
    }

    let n = m.len() as f64;
    let lo_m = (n * params.logratio_trim).floor() + 1.0;
    let hi_m = n + 1.0 - lo_m;
    let lo_a = (n * params.sum_trim).floor() + 1.0;
    let hi_a = n + 1.0 - lo_a;
    let rank_m = average_ranks(&m);
    let rank_a = average_ranks(&a);

    let keep: Vec<usize> = (0..m.len())
        .filter(|&g| {
            rank_m[g] >= lo_m && rank_m[g] <= hi_m && rank_a[g] >= lo_a && rank_a[g] <= hi_a
        })
        .collect();
    if keep.len() < params.min_trimmed_genes.max(1) {
        return None;
    }

    let log_factor = if params.do_weighting {
        let num: f64 = keep.iter().map(|&g| m[g] / v[g]).sum();
        let den: f64 = keep.iter().map(|&g| 1.0 / v[g]).sum();
        num / den
    } else {
        keep.iter().map(|&g| m[g]).sum::<f64>() / keep.len() as f64
    };
    Some(if log_factor.is_finite() { log_factor } else { 0.0 })
}

/// Estimate TMM normalization factors for every sample.
///
/// `lib_sizes` are the column sums of the (filtered) counts.
pub fn tmm_factors(
    counts: ArrayView2<f64>,
    lib_sizes: &[f64],
    sample_ids: &[String],
    params: &TmmParams,
) -> Result<NormalizationFactors> {
    params.validate()?;
    let (n_genes, n_samples) = counts.dim();
    if n_genes == 0 || n_samples == 0 {
        return Err(EdgerError::EmptyData {
            reason: "count matrix is empty".to_string(),
        });
    }
    if lib_sizes.len() != n_samples || sample_ids.len() != n_samples {
        return Err(EdgerError::DimensionMismatch {
            expected: format!("{} library sizes and sample IDs", n_samples),
            got: format!("{} and {}", lib_sizes.len(), sample_ids.len()),
        });
    }
    if let Some(j) = lib_sizes.iter().position(|&l| l <= 0.0) {
        return Err(EdgerError::InvalidCountMatrix {
            reason: format!("sample '{}' has no counts", sample_ids[j]),
        });
    }

    let ref_idx = reference_sample(counts, lib_sizes);
    let reference: Vec<f64> = counts.column(ref_idx).to_vec();
    log::debug!("TMM reference sample: {}", sample_ids[ref_idx]);

    let mut raw = Vec::with_capacity(n_samples);
    let mut fallback_samples = Vec::new();
    for j in 0..n_samples {
        let obs: Vec<f64> = counts.column(j).to_vec();
        match sample_log_factor(&obs, &reference, lib_sizes[j], lib_sizes[ref_idx], params) {
            Some(log_factor) => raw.push(log_factor.exp2()),
            None => {
                log::warn!(
                    "Too few genes for TMM in sample '{}'; using library size only",
                    sample_ids[j]
                );
                fallback_samples.push(j);
                raw.push(1.0);
            }
        }
    }

    let log_geo_mean = raw.iter().map(|f| f.ln()).sum::<f64>() / n_samples as f64;
    let factors: Vec<f64> = raw.iter().map(|f| (f.ln() - log_geo_mean).exp()).collect();

    Ok(NormalizationFactors {
        sample_ids: sample_ids.to_vec(),
        factors,
        library_sizes: lib_sizes.to_vec(),
        reference_sample: ref_idx,
        fallback_samples,
    })
}

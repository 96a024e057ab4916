//! Counts-per-million transformations
//!
//! All functions take effective library sizes (library size times
//! normalization factor) so the same code serves raw and TMM-scaled data.

use ndarray::{Array2, ArrayView2};

use crate::error::{EdgerError, Result};

/// Prior count used for average log-CPM abundance
pub const AVE_LOG_CPM_PRIOR: f64 = 2.0;

fn check_lib_sizes(n_samples: usize, lib_sizes: &[f64]) -> Result<()> {
    if lib_sizes.len() != n_samples {
        return Err(EdgerError::DimensionMismatch {
            expected: format!("{} library sizes", n_samples),
            got: format!("{} library sizes", lib_sizes.len()),
        });
    }
    if let Some((j, &lib)) = lib_sizes
        .iter()
        .enumerate()
        .find(|(_, &l)| !(l > 0.0 && l.is_finite()))
    {
        return Err(EdgerError::InvalidCountMatrix {
            reason: format!("sample {} has library size {}", j, lib),
        });
    }
    Ok(())
}

/// Prior counts scaled by library size relative to the mean library size
fn scaled_priors(lib_sizes: &[f64], prior_count: f64) -> Vec<f64> {
    let mean_lib = lib_sizes.iter().sum::<f64>() / lib_sizes.len() as f64;
    lib_sizes.iter().map(|&l| prior_count * l / mean_lib).collect()
}

/// Counts per million: y * 1e6 / lib
pub fn cpm(counts: ArrayView2<f64>, lib_sizes: &[f64]) -> Result<Array2<f64>> {
    check_lib_sizes(counts.ncols(), lib_sizes)?;
    let mut result = counts.to_owned();
    for (j, mut col) in result.columns_mut().into_iter().enumerate() {
        let lib = lib_sizes[j];
        col.mapv_inplace(|y| y * 1e6 / lib);
    }
    Ok(result)
}

/// log2 counts per million with an offset of `prior_count`.
///
/// The prior added to sample j is `prior_count * lib_j / mean(lib)` and the
/// library is enlarged by twice that amount. A prior of 0 gives plain
/// log2(CPM), which is negative infinity for zero counts.
pub fn log_cpm(counts: ArrayView2<f64>, lib_sizes: &[f64], prior_count: f64) -> Result<Array2<f64>> {
    check_lib_sizes(counts.ncols(), lib_sizes)?;
    let priors = scaled_priors(lib_sizes, prior_count);

    let mut result = counts.to_owned();
    for (j, mut col) in result.columns_mut().into_iter().enumerate() {
        let prior = priors[j];
        let lib = lib_sizes[j] + 2.0 * prior;
        col.mapv_inplace(|y| ((y + prior) * 1e6 / lib).log2());
    }
    Ok(result)
}

/// Average log2-CPM of each gene: the pooled one-group Poisson abundance
/// with prior-count-adjusted counts and libraries.
pub fn ave_log_cpm(counts: ArrayView2<f64>, lib_sizes: &[f64], prior_count: f64) -> Result<Vec<f64>> {
    check_lib_sizes(counts.ncols(), lib_sizes)?;
    let priors = scaled_priors(lib_sizes, prior_count);
    let total_lib: f64 = lib_sizes
        .iter()
        .zip(priors.iter())
        .map(|(&l, &p)| l + 2.0 * p)
        .sum();

    Ok(counts
        .rows()
        .into_iter()
        .map(|row| {
            let total: f64 = row.iter().zip(priors.iter()).map(|(&y, &p)| y + p).sum();
            (total * 1e6 / total_lib).log2()
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_cpm() {
        let counts = array![[100.0, 200.0], [300.0, 800.0]];
        let result = cpm(counts.view(), &[400.0, 1000.0]).unwrap();
        assert!((result[[0, 0]] - 250_000.0).abs() < 1e-6);
        assert!((result[[1, 1]] - 800_000.0).abs() < 1e-6);
    }

    #[test]
    fn test_log_cpm_zero_prior() {
        let counts = array![[0.0, 500.0], [1000.0, 500.0]];
        let result = log_cpm(counts.view(), &[1000.0, 1000.0], 0.0).unwrap();
        assert_eq!(result[[0, 0]], f64::NEG_INFINITY);
        assert!((result[[0, 1]] - (500_000.0f64).log2()).abs() < 1e-12);
    }

    #[test]
    fn test_log_cpm_prior_scaled_by_library() {
        let counts = array![[0.0, 0.0]];
        let result = log_cpm(counts.view(), &[1e6, 3e6], 2.0).unwrap();
        // priors 1 and 3; libraries 1e6 + 2 and 3e6 + 6 give the same CPM
        assert!((result[[0, 0]] - result[[0, 1]]).abs() < 1e-12);
        assert!(result[[0, 0]].is_finite());
    }

    #[test]
    fn test_ave_log_cpm_equal_libraries() {
        let counts = array![[10.0, 30.0]];
        let ave = ave_log_cpm(counts.view(), &[1e6, 1e6], 0.0).unwrap();
        assert!((ave[0] - 20.0f64.log2()).abs() < 1e-12);
    }

    #[test]
    fn test_zero_library_rejected() {
        let counts = array![[0.0, 3.0]];
        assert!(cpm(counts.view(), &[0.0, 3.0]).is_err());
        assert!(log_cpm(counts.view(), &[3.0], 0.0).is_err());
    }
}

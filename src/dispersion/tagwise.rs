//! Empirical Bayes shrinkage of gene-wise dispersions towards the trend

use ndarray::{ArrayView1, ArrayView2};

use super::cox_reid::adjusted_profile_loglik;
use super::optimize::{grid_golden_max, Maximum};
use super::DispersionParams;
use crate::glm::GlmFitParams;
use crate::stats::{mad, trigamma, trigamma_inverse};

/// Genes with raw dispersion below `min_disp` times this sit on the lower
/// boundary and are left out of the prior variance estimate
const BOUNDARY_FACTOR: f64 = 100.0;

/// Log-normal prior on dispersion around the trend
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DispersionPrior {
    /// Prior variance of log dispersion
    pub variance: f64,
    /// Prior degrees of freedom equivalent to `variance`. Reported only;
    /// the tagwise penalty uses `variance` directly.
    pub df: f64,
    /// Number of genes that contributed residuals
    pub n_residuals: usize,
}

/// Estimate the prior variance from the spread of log(raw / trend).
///
/// s^2 = mad(r)^2, sampling variance trigamma(df / 2),
/// prior variance = max(s^2 - trigamma(df / 2), min_prior_var).
pub fn estimate_prior(
    raw: &[f64],
    trended: &[f64],
    residual_df: usize,
    params: &DispersionParams,
) -> DispersionPrior {
    let residuals: Vec<f64> = raw
        .iter()
        .zip(trended.iter())
        .filter(|(&r, &t)| r >= params.min_disp * BOUNDARY_FACTOR && t > 0.0)
        .map(|(&r, &t)| r.ln() - t.ln())
        .filter(|v| v.is_finite())
        .collect();

    let variance = if residuals.len() < 3 || residual_df == 0 {
        params.min_prior_var
    } else {
        let spread = mad(&residuals).powi(2);
        let sampling = trigamma(residual_df as f64 / 2.0);
        (spread - sampling).max(params.min_prior_var)
    };
    let df = 2.0 * trigamma_inverse(variance);

    log::debug!(
        "Dispersion prior: {} residuals, variance {:.4}, df {:.3}",
        residuals.len(),
        variance,
        df
    );

    DispersionPrior {
        variance,
        df,
        n_residuals: residuals.len(),
    }
}

/// Maximize APL(phi) - (log phi - log trend)^2 / (2 prior_var) for one gene,
/// then clamp between the raw and trended values
#[allow(clippy::too_many_arguments)]
pub fn tagwise_dispersion(
    counts: ArrayView1<f64>,
    design: ArrayView2<f64>,
    log_offsets: &[f64],
    raw: f64,
    trend: f64,
    prior: &DispersionPrior,
    bounds: (f64, f64),
    params: &DispersionParams,
    glm_params: &GlmFitParams,
) -> (f64, Maximum) {
    let log_trend = trend.ln();
    let mut warm: Option<Vec<f64>> = None;

    let best = grid_golden_max(
        |log_phi| {
            let point = adjusted_profile_loglik(
                counts,
                design,
                log_offsets,
                log_phi.exp(),
                warm.as_deref(),
                glm_params,
            );
            warm = Some(point.coefficients);
            let dev = log_phi - log_trend;
            point.apl - dev * dev / (2.0 * prior.variance)
        },
        bounds.0,
        bounds.1,
        params.grid_points,
        params.tol,
        params.max_iter,
    );

    let (lo, hi) = (raw.min(trend), raw.max(trend));
    (best.argmax.exp().clamp(lo, hi), best)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_prior_floor_with_few_residuals() {
        let prior = estimate_prior(&[0.1, 0.2], &[0.1, 0.1], 4, &DispersionParams::default());
        assert_eq!(prior.variance, 0.25);
        assert_eq!(prior.n_residuals, 2);
        // trigamma(df / 2) = variance
        assert!((trigamma(prior.df / 2.0) - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_prior_ignores_boundary_genes() {
        let raw = [1e-8, 1e-8, 0.1, 0.5, 0.05, 1.0];
        let trend = [0.2; 6];
        let prior = estimate_prior(&raw, &trend, 4, &DispersionParams::default());
        assert_eq!(prior.n_residuals, 4);
    }

    #[test]
    fn test_prior_variance_from_spread() {
        // Residuals 0, +-2 log units: mad = 1.4826 * 2
        let trend = [0.1; 5];
        let raw: Vec<f64> = [-2.0, -2.0, 0.0, 2.0, 2.0]
            .iter()
            .map(|&r: &f64| 0.1 * r.exp())
            .collect();
        let prior = estimate_prior(&raw, &trend, 10, &DispersionParams::default());
        let expected = (1.4826 * 2.0_f64).powi(2) - trigamma(5.0);
        assert!((prior.variance - expected).abs() < 1e-9);
    }

    #[test]
    fn test_tagwise_between_raw_and_trend() {
        let y = array![5.0, 60.0, 12.0, 90.0, 3.0, 40.0];
        let x = array![[1.0], [1.0], [1.0], [1.0], [1.0], [1.0]];
        let offsets = vec![0.0; 6];
        let params = DispersionParams::default();
        let prior = DispersionPrior { variance: 0.25, df: 2.0 * trigamma_inverse(0.25), n_residuals: 10 };
        let bounds = (params.min_disp.ln(), 10.0_f64.ln());
        let (raw, trend) = (1.2, 0.1);
        let (tagwise, _) = tagwise_dispersion(
            y.view(),
            x.view(),
            &offsets,
            raw,
            trend,
            &prior,
            bounds,
            &params,
            &GlmFitParams::default(),
        );
        assert!(tagwise > trend && tagwise < raw);
    }
}

//! Abundance-dependent dispersion trend
//!
//! Local linear regression of log raw dispersion on average log-CPM, using
//! the tricube-weighted smoother in `stats`.

use crate::stats::loess_smooth;

/// Default smoothing span: 1 for up to 50 genes, shrinking as
/// 0.25 + 0.75 * sqrt(50 / G) for larger gene sets
pub fn default_trend_span(n_genes: usize) -> f64 {
    const SMALL_N: f64 = 50.0;
    if n_genes as f64 <= SMALL_N {
        return 1.0;
    }
    (0.25 + 0.75 * (SMALL_N / n_genes as f64).sqrt()).min(1.0)
}

/// Trended dispersion for every gene.
///
/// `raw` values are raised to `min_disp` before taking logs. Fitted values
/// are not floored; the caller clamps them and records a warning.
pub fn fit_dispersion_trend(
    ave_log_cpm: &[f64],
    raw: &[f64],
    span: f64,
    min_disp: f64,
) -> Vec<f64> {
    let log_raw: Vec<f64> = raw.iter().map(|&d| d.max(min_disp).ln()).collect();
    let fitted = loess_smooth(ave_log_cpm, &log_raw, span);
    log::debug!("Dispersion trend fitted over {} genes with span {:.3}", raw.len(), span);
    fitted.into_iter().map(f64::exp).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_span() {
        assert_eq!(default_trend_span(10), 1.0);
        assert_eq!(default_trend_span(50), 1.0);
        let s = default_trend_span(5000);
        assert!((s - (0.25 + 0.75 * 0.1)).abs() < 1e-12);
    }

    #[test]
    fn test_trend_follows_log_linear_relationship() {
        // log(phi) = -1 - 0.3 * A exactly
        let a: Vec<f64> = (0..40).map(|i| i as f64 * 0.25).collect();
        let raw: Vec<f64> = a.iter().map(|&x| (-1.0 - 0.3 * x).exp()).collect();
        let trend = fit_dispersion_trend(&a, &raw, 0.5, 1e-8);
        for (t, r) in trend.iter().zip(raw.iter()) {
            assert!((t / r - 1.0).abs() < 1e-8);
        }
    }

    #[test]
    fn test_trend_raises_raw_to_floor() {
        let trend = fit_dispersion_trend(&[1.0, 2.0, 3.0], &[1e-12, 1e-12, 1e-12], 1.0, 1e-8);
        assert!(trend.iter().all(|&t| (t / 1e-8 - 1.0).abs() < 1e-9));
    }
}

//! Statistical utility functions shared across modules
//!
//! Robust scale, quantiles, polygamma helpers and the local-regression smoother
//! used by dispersion trend fitting and prior estimation.

use std::cmp::Ordering;

/// Scale constant making the MAD consistent for the normal standard deviation
const MAD_CONSTANT: f64 = 1.4826;

fn total_cmp_nan_last(a: &f64, b: &f64) -> Ordering {
    a.partial_cmp(b).unwrap_or_else(|| match (a.is_nan(), b.is_nan()) {
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        _ => Ordering::Equal,
    })
}

/// Median of the finite values in `x`. Returns NaN when none are finite.
pub fn median(x: &[f64]) -> f64 {
    let mut v: Vec<f64> = x.iter().copied().filter(|v| v.is_finite()).collect();
    if v.is_empty() {
        return f64::NAN;
    }
    v.sort_by(total_cmp_nan_last);
    let n = v.len();
    if n % 2 == 0 {
        (v[n / 2 - 1] + v[n / 2]) / 2.0
    } else {
        v[n / 2]
    }
}

/// Median absolute deviation scaled to the normal standard deviation
pub fn mad(x: &[f64]) -> f64 {
    let center = median(x);
    if !center.is_finite() {
        return f64::NAN;
    }
    let dev: Vec<f64> = x
        .iter()
        .filter(|v| v.is_finite())
        .map(|&v| (v - center).abs())
        .collect();
    MAD_CONSTANT * median(&dev)
}

/// Sample quantile with linear interpolation between order statistics
/// (the "type 7" definition). `x` need not be sorted.
pub fn quantile(x: &[f64], prob: f64) -> f64 {
    let mut v: Vec<f64> = x.iter().copied().filter(|v| !v.is_nan()).collect();
    if v.is_empty() {
        return f64::NAN;
    }
    v.sort_by(total_cmp_nan_last);
    let h = (v.len() - 1) as f64 * prob.clamp(0.0, 1.0);
    let lo = h.floor() as usize;
    let hi = h.ceil() as usize;
    v[lo] + (h - lo as f64) * (v[hi] - v[lo])
}

/// Trigamma function psi'(x) via recurrence and asymptotic expansion
pub fn trigamma(x: f64) -> f64 {
    if x < 0.5 {
        let pi = std::f64::consts::PI;
        return (pi / (pi * x).sin()).powi(2) - trigamma(1.0 - x);
    }

    if x >= 8.0 {
        let x2 = x * x;
        return 1.0 / x + 0.5 / x2 + 1.0 / (6.0 * x2 * x) - 1.0 / (30.0 * x2 * x2 * x)
            + 1.0 / (42.0 * x2 * x2 * x2 * x);
    }

    let mut result = 0.0;
    let mut z = x;
    while z < 8.0 {
        result += 1.0 / (z * z);
        z += 1.0;
    }
    result + trigamma(z)
}

/// Tetragamma function psi''(x) for x > 0
pub fn tetragamma(x: f64) -> f64 {
    let mut result = 0.0;
    let mut z = x;
    while z < 8.0 {
        result -= 2.0 / (z * z * z);
        z += 1.0;
    }
    let z2 = z * z;
    let z3 = z2 * z;
    result - 1.0 / z2 - 1.0 / z3 - 1.0 / (2.0 * z2 * z2) + 1.0 / (6.0 * z3 * z3)
        - 1.0 / (6.0 * z2 * z3 * z3)
}

/// Solve trigamma(y) = x for y by Newton iteration on 1/trigamma
pub fn trigamma_inverse(x: f64) -> f64 {
    if !x.is_finite() || x <= 0.0 {
        return f64::NAN;
    }
    if x > 1e7 {
        return 1.0 / x.sqrt();
    }
    if x < 1e-6 {
        return 1.0 / x;
    }

    let mut y = 0.5 + 1.0 / x;
    for _ in 0..50 {
        let tri = trigamma(y);
        let dif = tri * (1.0 - tri / x) / tetragamma(y);
        y += dif;
        if -dif / y < 1e-8 {
            break;
        }
    }
    y
}

/// Local linear regression smoother with tricube weights.
///
/// Each point is fitted from its `ceil(span * n)` nearest neighbours in `x`.
/// Returns the fitted value at every input point. Neighbour windows are
/// contiguous in sorted order, so the cost is O(n * k).
pub fn loess_smooth(x: &[f64], y: &[f64], span: f64) -> Vec<f64> {
    let n = x.len();
    if n == 0 {
        return vec![];
    }
    if n == 1 {
        return vec![y[0]];
    }

    let k = ((span * n as f64).ceil() as usize).clamp(2, n);

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| total_cmp_nan_last(&x[a], &x[b]).then(a.cmp(&b)));
    let xs: Vec<f64> = order.iter().map(|&i| x[i]).collect();
    let ys: Vec<f64> = order.iter().map(|&i| y[i]).collect();

    let mut fitted = vec![0.0; n];
    let mut lo = 0usize;
    for i in 0..n {
        if lo + k - 1 < i {
            lo = i + 1 - k;
        }
        while lo + k < n && xs[lo + k] - xs[i] < xs[i] - xs[lo] {
            lo += 1;
        }
        let hi = lo + k;
        let max_dist = (xs[i] - xs[lo]).max(xs[hi - 1] - xs[i]);

        let mut sw = 0.0;
        let mut swx = 0.0;
        let mut swy = 0.0;
        let weights: Vec<f64> = (lo..hi)
            .map(|j| {
                let w = if max_dist > 0.0 {
                    // Widen slightly so the farthest neighbour keeps a small weight
                    let u = (xs[j] - xs[i]).abs() / (max_dist * 1.001);
                    (1.0 - u.powi(3)).powi(3)
                } else {
                    1.0
                };
                sw += w;
                swx += w * xs[j];
                swy += w * ys[j];
                w
            })
            .collect();

        let xm = swx / sw;
        let ym = swy / sw;
        let mut sxx = 0.0;
        let mut sxy = 0.0;
        for (offset, j) in (lo..hi).enumerate() {
            let w = weights[offset];
            sxx += w * (xs[j] - xm) * (xs[j] - xm);
            sxy += w * (xs[j] - xm) * (ys[j] - ym);
        }

        fitted[order[i]] = if sxx > 1e-12 {
            ym + sxy / sxx * (xs[i] - xm)
        } else {
            ym
        };
    }

    fitted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_median_and_mad() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&[4.0, 1.0, 2.0, 3.0]), 2.5);
        assert!(median(&[]).is_nan());
        // |x - 2| = 1, 0, 1 -> median 1
        assert!((mad(&[1.0, 2.0, 3.0]) - MAD_CONSTANT).abs() < 1e-12);
    }

    #[test]
    fn test_quantile_type7() {
        let x = [1.0, 2.0, 3.0, 4.0];
        assert!((quantile(&x, 0.75) - 3.25).abs() < 1e-12);
        assert!((quantile(&x, 0.0) - 1.0).abs() < 1e-12);
        assert!((quantile(&x, 1.0) - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_trigamma_known_values() {
        // psi'(1) = pi^2 / 6
        let pi2_6 = std::f64::consts::PI.powi(2) / 6.0;
        assert!((trigamma(1.0) - pi2_6).abs() < 1e-8);
        // psi'(x) ~ 1/x for large x
        assert!((trigamma(1e6) - 1e-6).abs() < 1e-11);
    }

    #[test]
    fn test_trigamma_inverse_roundtrip() {
        for &y in &[0.3, 1.0, 2.5, 10.0, 150.0] {
            let x = trigamma(y);
            let back = trigamma_inverse(x);
            assert!((back - y).abs() / y < 1e-6, "y={} back={}", y, back);
        }
    }

    #[test]
    fn test_loess_recovers_line() {
        let x: Vec<f64> = (0..50).map(|i| i as f64 * 0.1).collect();
        let y: Vec<f64> = x.iter().map(|&v| 2.0 * v - 1.0).collect();
        let fit = loess_smooth(&x, &y, 0.3);
        for (f, t) in fit.iter().zip(y.iter()) {
            assert!((f - t).abs() < 1e-9);
        }
    }

    #[test]
    fn test_loess_unsorted_input_keeps_order() {
        let x = vec![3.0, 1.0, 2.0, 0.0];
        let y = vec![6.0, 2.0, 4.0, 0.0];
        let fit = loess_smooth(&x, &y, 1.0);
        for (f, t) in fit.iter().zip(y.iter()) {
            assert!((f - t).abs() < 1e-9);
        }
    }
}

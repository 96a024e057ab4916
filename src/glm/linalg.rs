//! Small dense linear algebra on row-major `Vec<f64>` buffers
//!
//! Designs have a handful of columns, so everything here is direct
//! Cholesky work on p x p matrices.

use ndarray::ArrayView2;

/// Pivots at or below this are treated as a rank-deficient system
const PIVOT_EPS: f64 = 1e-12;

/// X' W X for a design with per-sample weights, row-major p x p
pub fn weighted_gram(design: ArrayView2<f64>, weights: &[f64]) -> Vec<f64> {
    let p = design.ncols();
    let mut xtwx = vec![0.0; p * p];
    for (i, row) in design.rows().into_iter().enumerate() {
        let w = weights[i];
        for j in 0..p {
            let wx = w * row[j];
            for k in 0..=j {
                xtwx[j * p + k] += wx * row[k];
            }
        }
    }
    for j in 0..p {
        for k in 0..j {
            xtwx[k * p + j] = xtwx[j * p + k];
        }
    }
    xtwx
}

/// X' W z
pub fn weighted_cross(design: ArrayView2<f64>, weights: &[f64], z: &[f64]) -> Vec<f64> {
    let p = design.ncols();
    let mut xtwz = vec![0.0; p];
    for (i, row) in design.rows().into_iter().enumerate() {
        let wz = weights[i] * z[i];
        for j in 0..p {
            xtwz[j] += row[j] * wz;
        }
    }
    xtwz
}

/// Lower Cholesky factor of a symmetric positive definite matrix.
/// Returns None when a pivot is not positive.
pub fn cholesky(a: &[f64], n: usize) -> Option<Vec<f64>> {
    let mut l = vec![0.0; n * n];
    for i in 0..n {
        for j in 0..=i {
            let mut sum = a[i * n + j];
            for k in 0..j {
                sum -= l[i * n + k] * l[j * n + k];
            }
            if i == j {
                if sum <= PIVOT_EPS || !sum.is_finite() {
                    return None;
                }
                l[i * n + j] = sum.sqrt();
            } else {
                l[i * n + j] = sum / l[j * n + j];
            }
        }
    }
    Some(l)
}

/// Solve L L' x = b given the lower factor
pub fn cholesky_solve(l: &[f64], b: &[f64], n: usize) -> Vec<f64> {
    let mut y = vec![0.0; n];
    for i in 0..n {
        let mut sum = b[i];
        for j in 0..i {
            sum -= l[i * n + j] * y[j];
        }
        y[i] = sum / l[i * n + i];
    }

    let mut x = vec![0.0; n];
    for i in (0..n).rev() {
        let mut sum = y[i];
        for j in (i + 1)..n {
            sum -= l[j * n + i] * x[j];
        }
        x[i] = sum / l[i * n + i];
    }
    x
}

/// Solve a symmetric positive definite system, None if it is singular
pub fn solve_spd(a: &[f64], b: &[f64], n: usize) -> Option<Vec<f64>> {
    cholesky(a, n).map(|l| cholesky_solve(&l, b, n))
}

/// log det of a symmetric positive semi-definite matrix.
///
/// Non-positive pivots are floored at `PIVOT_EPS` so the Cox-Reid penalty stays
/// finite for genes whose fitted means collapse towards zero.
pub fn log_det_spd(a: &[f64], n: usize) -> f64 {
    let mut l = vec![0.0; n * n];
    let mut log_det = 0.0;
    for i in 0..n {
        for j in 0..=i {
            let mut sum = a[i * n + j];
            for k in 0..j {
                sum -= l[i * n + k] * l[j * n + k];
            }
            if i == j {
                let pivot = if sum > PIVOT_EPS && sum.is_finite() { sum } else { PIVOT_EPS };
                l[i * n + j] = pivot.sqrt();
                log_det += pivot.ln();
            } else {
                l[i * n + j] = sum / l[j * n + j];
            }
        }
    }
    log_det
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_solve_spd() {
        // [4 2; 2 3] x = [2; 1] -> x = [0.5, 0]
        let a = vec![4.0, 2.0, 2.0, 3.0];
        let x = solve_spd(&a, &[2.0, 1.0], 2).unwrap();
        assert!((x[0] - 0.5).abs() < 1e-12);
        assert!(x[1].abs() < 1e-12);
    }

    #[test]
    fn test_singular_rejected() {
        let a = vec![1.0, 1.0, 1.0, 1.0];
        assert!(solve_spd(&a, &[1.0, 1.0], 2).is_none());
    }

    #[test]
    fn test_log_det() {
        let a = vec![4.0, 2.0, 2.0, 3.0];
        assert!((log_det_spd(&a, 2) - 8.0_f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn test_weighted_gram_matches_manual() {
        let x = array![[1.0, 0.0], [1.0, 1.0], [1.0, 1.0]];
        let w = [1.0, 2.0, 3.0];
        let g = weighted_gram(x.view(), &w);
        assert_eq!(g, vec![6.0, 5.0, 5.0, 5.0]);
        let c = weighted_cross(x.view(), &w, &[1.0, 1.0, 2.0]);
        assert_eq!(c, vec![9.0, 8.0]);
    }
}

//! One-dimensional maximization on a bounded interval
//!
//! A coarse grid locates the best bracket, then golden-section search
//! refines inside it. Dispersion likelihoods are usually unimodal in
//! log-dispersion but can be flat or monotone, so the grid keeps the search
//! from settling in a poor local region.

/// Result of a bounded maximization
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Maximum {
    pub argmax: f64,
    pub value: f64,
    pub iterations: usize,
    /// False when `max_iter` ran out before the bracket shrank below `tol`
    pub converged: bool,
}

const INV_PHI: f64 = 0.618_033_988_749_894_9;

fn score(v: f64) -> f64 {
    if v.is_nan() {
        f64::NEG_INFINITY
    } else {
        v
    }
}

/// Golden-section search for the maximum of `f` on `[lower, upper]`
pub fn golden_section_max<F: FnMut(f64) -> f64>(
    mut f: F,
    lower: f64,
    upper: f64,
    tol: f64,
    max_iter: usize,
) -> Maximum {
    let (mut a, mut b) = (lower.min(upper), lower.max(upper));
    let mut x1 = b - INV_PHI * (b - a);
    let mut x2 = a + INV_PHI * (b - a);
    let mut f1 = score(f(x1));
    let mut f2 = score(f(x2));

    let mut iterations = 0;
    while b - a > tol && iterations < max_iter {
        iterations += 1;
        if f1 >= f2 {
            b = x2;
            x2 = x1;
            f2 = f1;
            x1 = b - INV_PHI * (b - a);
            f1 = score(f(x1));
        } else {
            a = x1;
            x1 = x2;
            f1 = f2;
            x2 = a + INV_PHI * (b - a);
            f2 = score(f(x2));
        }
    }

    let (argmax, value) = if f1 >= f2 { (x1, f1) } else { (x2, f2) };
    Maximum {
        argmax,
        value,
        iterations,
        converged: b - a <= tol,
    }
}

/// Grid over `[lower, upper]` followed by golden-section search in the
/// neighbourhood of the best grid point
pub fn grid_golden_max<F: FnMut(f64) -> f64>(
    mut f: F,
    lower: f64,
    upper: f64,
    grid_points: usize,
    tol: f64,
    max_iter: usize,
) -> Maximum {
    let n = grid_points.max(3);
    let step = (upper - lower) / (n - 1) as f64;

    let mut best_x = lower;
    let mut best_v = f64::NEG_INFINITY;
    for i in 0..n {
        let x = lower + i as f64 * step;
        let v = score(f(x));
        if v > best_v {
            best_x = x;
            best_v = v;
        }
    }

    let lo = (best_x - step).max(lower);
    let hi = (best_x + step).min(upper);
    let refined = golden_section_max(&mut f, lo, hi, tol, max_iter);
    if refined.value >= best_v {
        refined
    } else {
        Maximum {
            argmax: best_x,
            value: best_v,
            ..refined
        }
    }
}

//! Contrast specification and null-model designs
//!
//! Contrasts are given against the design columns as supplied by the
//! caller, before all-zero columns were dropped, and are mapped onto the
//! retained columns here.

use ndarray::{Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::data::SampleDesign;
use crate::error::{EdgerError, Result};

/// A contrast in the original design column space
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContrastSpec {
    /// Test a single coefficient equal to zero
    Coefficient(usize),
    /// Test a linear combination of coefficients equal to zero
    Vector(Vec<f64>),
}

/// A contrast mapped onto the retained design columns
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedContrast {
    /// Weights over retained columns
    pub weights: Vec<f64>,
    /// Set when the contrast is a single retained coefficient
    pub coefficient: Option<usize>,
    /// Number of constraints tested: 0 for an all-zero vector, otherwise 1
    pub rank: usize,
    pub label: String,
}

impl ContrastSpec {
    /// Validate against `design` and map onto its retained columns
    pub fn resolve(&self, design: &SampleDesign) -> Result<ResolvedContrast> {
        let n_original = design.n_original_columns();
        let names = design.original_column_names();

        match self {
            ContrastSpec::Coefficient(j) => {
                if *j >= n_original {
                    return Err(EdgerError::InvalidContrast {
                        reason: format!(
                            "coefficient {} out of range for a design with {} columns",
                            j, n_original
                        ),
                    });
                }
                let kept = design.kept_index(*j).ok_or_else(|| EdgerError::InvalidContrast {
                    reason: format!("coefficient '{}' was dropped as an all-zero column", names[*j]),
                })?;
                let mut weights = vec![0.0; design.n_coefs()];
                weights[kept] = 1.0;
                Ok(ResolvedContrast {
                    weights,
                    coefficient: Some(kept),
                    rank: 1,
                    label: names[*j].clone(),
                })
            }
            ContrastSpec::Vector(v) => {
                if v.len() != n_original {
                    return Err(EdgerError::InvalidContrast {
                        reason: format!(
                            "contrast has {} entries but the design has {} columns",
                            v.len(),
                            n_original
                        ),
                    });
                }
                if v.iter().any(|w| !w.is_finite()) {
                    return Err(EdgerError::InvalidContrast {
                        reason: "contrast contains non-finite weights".to_string(),
                    });
                }
                if let Some(j) = design.dropped_columns().into_iter().find(|&j| v[j] != 0.0) {
                    return Err(EdgerError::InvalidContrast {
                        reason: format!(
                            "contrast weights dropped all-zero column '{}'",
                            names[j]
                        ),
                    });
                }

                let weights: Vec<f64> = design.kept_columns().iter().map(|&j| v[j]).collect();
                let rank = usize::from(weights.iter().any(|&w| w != 0.0));
                let label = names
                    .iter()
                    .zip(v.iter())
                    .filter(|(_, &w)| w != 0.0)
                    .map(|(n, w)| format!("{}*{}", w, n))
                    .collect::<Vec<_>>()
                    .join(" + ");
                Ok(ResolvedContrast {
                    weights,
                    coefficient: None,
                    rank,
                    label: if label.is_empty() { "0".to_string() } else { label },
                })
            }
        }
    }
}

/// Design of the model constrained by c' beta = 0.
///
/// A single coefficient is removed directly. A general vector is handled by
/// a Householder reflection H whose first column is parallel to c; the null
/// design is X H with that first column removed.
pub fn null_design(design: ArrayView2<f64>, contrast: &ResolvedContrast) -> Array2<f64> {
    let p = design.ncols();
    if let Some(j) = contrast.coefficient {
        let keep: Vec<usize> = (0..p).filter(|&k| k != j).collect();
        return design.select(Axis(1), &keep);
    }

    let norm = contrast.weights.iter().map(|w| w * w).sum::<f64>().sqrt();
    let u: Vec<f64> = contrast.weights.iter().map(|w| w / norm).collect();
    let sign = if u[0] >= 0.0 { 1.0 } else { -1.0 };
    let mut v = u.clone();
    v[0] += sign;
    let v_sq: f64 = v.iter().map(|x| x * x).sum();

    // Columns 1..p of H = I - 2 v v' / (v'v)
    let mut basis = Array2::zeros((p, p - 1));
    for r in 0..p {
        for c in 1..p {
            let identity = if r == c { 1.0 } else { 0.0 };
            basis[[r, c - 1]] = identity - 2.0 * v[r] * v[c] / v_sq;
        }
    }
    design.dot(&basis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn design() -> SampleDesign {
        // Column 1 is all zero and gets dropped
        let x = array![
            [1.0, 0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0, 0.0],
            [1.0, 0.0, 1.0, 0.0],
            [1.0, 0.0, 1.0, 0.0],
            [1.0, 0.0, 0.0, 1.0],
            [1.0, 0.0, 0.0, 1.0]
        ];
        SampleDesign::new(
            x,
            vec!["int".into(), "empty".into(), "b".into(), "c".into()],
            (1..=6).map(|i| format!("s{}", i)).collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_coefficient_maps_past_dropped_column() {
        let r = ContrastSpec::Coefficient(2).resolve(&design()).unwrap();
        assert_eq!(r.weights, vec![0.0, 1.0, 0.0]);
        assert_eq!(r.coefficient, Some(1));
        assert_eq!(r.label, "b");
    }

    #[test]
    fn test_dropped_coefficient_rejected() {
        let err = ContrastSpec::Coefficient(1).resolve(&design()).unwrap_err();
        assert!(matches!(err, EdgerError::InvalidContrast { .. }));
        assert!(ContrastSpec::Coefficient(4).resolve(&design()).is_err());
    }

    #[test]
    fn test_vector_validation() {
        assert!(ContrastSpec::Vector(vec![0.0, 0.0, 1.0]).resolve(&design()).is_err());
        assert!(ContrastSpec::Vector(vec![0.0, 1.0, 1.0, 0.0]).resolve(&design()).is_err());
        let r = ContrastSpec::Vector(vec![0.0, 0.0, 1.0, -1.0]).resolve(&design()).unwrap();
        assert_eq!(r.weights, vec![0.0, 1.0, -1.0]);
        assert_eq!(r.rank, 1);
    }

    #[test]
    fn test_zero_vector_has_rank_zero() {
        let r = ContrastSpec::Vector(vec![0.0; 4]).resolve(&design()).unwrap();
        assert_eq!(r.rank, 0);
    }

    #[test]
    fn test_null_design_orthogonal_to_contrast() {
        let d = design();
        let r = ContrastSpec::Vector(vec![0.0, 0.0, 1.0, -1.0]).resolve(&d).unwrap();
        let x0 = null_design(d.matrix(), &r);
        assert_eq!(x0.ncols(), 2);
        // Samples in groups b and c must be indistinguishable under the null
        for j in 0..2 {
            assert!((x0[[2, j]] - x0[[4, j]]).abs() < 1e-12);
        }
    }
}

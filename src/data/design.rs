//! Numeric design matrices and treatment coding of categorical factors

use std::collections::{HashMap, HashSet};

use ndarray::{Array2, ArrayView2, Axis};

use super::metadata::SampleTable;
use crate::error::{EdgerError, Result};

/// Samples x coefficients design with all-zero columns removed.
///
/// Column indices used by callers (contrasts in particular) refer to the
/// original column layout; `kept_columns` maps retained columns back to it.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleDesign {
    matrix: Array2<f64>,
    sample_ids: Vec<String>,
    column_names: Vec<String>,
    original_names: Vec<String>,
    kept_columns: Vec<usize>,
}

impl SampleDesign {
    /// Build a design. Zero columns are dropped left to right; the rest must
    /// be full column rank.
    pub fn new(
        matrix: Array2<f64>,
        column_names: Vec<String>,
        sample_ids: Vec<String>,
    ) -> Result<Self> {
        let (n_samples, n_cols) = matrix.dim();
        if column_names.len() != n_cols {
            return Err(EdgerError::DimensionMismatch {
                expected: format!("{} column names", n_cols),
                got: format!("{} column names", column_names.len()),
            });
        }
        if sample_ids.len() != n_samples {
            return Err(EdgerError::DimensionMismatch {
                expected: format!("{} sample IDs", n_samples),
                got: format!("{} sample IDs", sample_ids.len()),
            });
        }
        if matrix.iter().any(|v| !v.is_finite()) {
            return Err(EdgerError::InvalidDesignMatrix {
                reason: "design matrix contains non-finite values".to_string(),
            });
        }
        let mut seen = HashSet::new();
        if let Some(dup) = sample_ids.iter().find(|id| !seen.insert(id.as_str())) {
            return Err(EdgerError::InvalidDesignMatrix {
                reason: format!("duplicate sample identifier '{}'", dup),
            });
        }

        let kept_columns: Vec<usize> = (0..n_cols)
            .filter(|&j| matrix.column(j).iter().any(|&v| v != 0.0))
            .collect();
        for j in (0..n_cols).filter(|j| !kept_columns.contains(j)) {
            log::warn!("Dropping all-zero design column '{}'", column_names[j]);
        }
        if kept_columns.is_empty() {
            return Err(EdgerError::InvalidDesignMatrix {
                reason: "every design column is zero".to_string(),
            });
        }

        let kept = matrix.select(Axis(1), &kept_columns);
        check_full_rank(&kept)?;

        Ok(Self {
            column_names: kept_columns.iter().map(|&j| column_names[j].clone()).collect(),
            matrix: kept,
            sample_ids,
            original_names: column_names,
            kept_columns,
        })
    }

    pub fn matrix(&self) -> ArrayView2<'_, f64> {
        self.matrix.view()
    }

    pub fn n_samples(&self) -> usize {
        self.matrix.nrows()
    }

    /// Number of retained coefficients
    pub fn n_coefs(&self) -> usize {
        self.matrix.ncols()
    }

    /// Residual degrees of freedom, samples minus coefficients
    pub fn residual_df(&self) -> usize {
        self.n_samples().saturating_sub(self.n_coefs())
    }

    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    /// Names of the retained columns
    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    /// Names of all columns as supplied, including dropped ones
    pub fn original_column_names(&self) -> &[String] {
        &self.original_names
    }

    pub fn n_original_columns(&self) -> usize {
        self.original_names.len()
    }

    /// Original indices of the retained columns
    pub fn kept_columns(&self) -> &[usize] {
        &self.kept_columns
    }

    /// Original indices of the dropped zero columns
    pub fn dropped_columns(&self) -> Vec<usize> {
        (0..self.original_names.len())
            .filter(|j| !self.kept_columns.contains(j))
            .collect()
    }

    /// Position of an original column among the retained ones
    pub fn kept_index(&self, original: usize) -> Option<usize> {
        self.kept_columns.iter().position(|&j| j == original)
    }

    /// Reorder rows to follow `sample_ids`. Both sides must name the same samples.
    pub fn align_to(&self, sample_ids: &[String]) -> Result<Self> {
        if sample_ids.len() != self.sample_ids.len() {
            return Err(EdgerError::SampleMismatch {
                reason: format!(
                    "count table has {} samples, design has {}",
                    sample_ids.len(),
                    self.sample_ids.len()
                ),
            });
        }
        let position: HashMap<&str, usize> = self
            .sample_ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.as_str(), i))
            .collect();
        let order = sample_ids
            .iter()
            .map(|id| {
                position.get(id.as_str()).copied().ok_or_else(|| EdgerError::SampleMismatch {
                    reason: format!("sample '{}' is missing from the design", id),
                })
            })
            .collect::<Result<Vec<usize>>>()?;

        Ok(Self {
            matrix: self.matrix.select(Axis(0), &order),
            sample_ids: sample_ids.to_vec(),
            column_names: self.column_names.clone(),
            original_names: self.original_names.clone(),
            kept_columns: self.kept_columns.clone(),
        })
    }
}

/// Treatment coding of categorical factors: an intercept column followed by
/// one indicator per non-reference level of each factor, in factor order.
///
/// Levels are sorted; the reference level is taken from `reference_levels`
/// when given, otherwise the first sorted level. Columns are named
/// `factor_level`.
pub fn encode_factors(
    table: &SampleTable,
    factors: &[String],
    reference_levels: &HashMap<String, String>,
) -> Result<SampleDesign> {
    if factors.is_empty() {
        return Err(EdgerError::InvalidDesignMatrix {
            reason: "at least one factor is required".to_string(),
        });
    }

    let n = table.n_samples();
    let mut names = vec!["(Intercept)".to_string()];
    let mut columns: Vec<Vec<f64>> = vec![vec![1.0; n]];

    for factor in factors {
        let values = table.column(factor)?;
        let mut levels = table.levels(factor)?;
        let reference = match reference_levels.get(factor) {
            Some(r) if levels.contains(r) => r.clone(),
            Some(r) => {
                return Err(EdgerError::InvalidMetadata {
                    reason: format!("reference level '{}' not found in factor '{}'", r, factor),
                })
            }
            None => levels[0].clone(),
        };
        levels.retain(|l| *l != reference);
        log::debug!("Factor '{}': reference level '{}'", factor, reference);

        for level in levels {
            columns.push(values.iter().map(|v| if *v == level { 1.0 } else { 0.0 }).collect());
            names.push(format!("{}_{}", factor, level));
        }
    }

    let mut matrix = Array2::zeros((n, columns.len()));
    for (j, col) in columns.iter().enumerate() {
        for (i, &v) in col.iter().enumerate() {
            matrix[[i, j]] = v;
        }
    }

    SampleDesign::new(matrix, names, table.sample_ids().to_vec())
}

/// Check that a design matrix has full column rank
pub fn check_full_rank(matrix: &Array2<f64>) -> Result<()> {
    let (nrow, ncol) = matrix.dim();
    if nrow == 0 || ncol == 0 {
        return Err(EdgerError::InvalidDesignMatrix {
            reason: "design matrix has zero rows or columns".to_string(),
        });
    }

    let rank = qr_rank(matrix);
    if rank < ncol {
        return Err(EdgerError::InvalidDesignMatrix {
            reason: format!(
                "design matrix is not full rank (rank {} with {} columns); \
                 some columns are linear combinations of others",
                rank, ncol
            ),
        });
    }
    Ok(())
}

/// Numerical rank by Householder QR with column pivoting.
///
/// Counts diagonal entries of R above `max(nrow, ncol) * eps * max|diag(R)|`.
fn qr_rank(matrix: &Array2<f64>) -> usize {
    let (nrow, ncol) = matrix.dim();
    let k = nrow.min(ncol);
    let mut r = matrix.to_owned();

    let mut steps = k;
    let mut col_norms_sq: Vec<f64> = (0..ncol)
        .map(|j| r.column(j).iter().map(|&v| v * v).sum())
        .collect();

    for step in 0..k {
        let best_col = (step..ncol)
            .fold(step, |best, j| if col_norms_sq[j] > col_norms_sq[best] { j } else { best });
        if best_col != step {
            for i in 0..nrow {
                r.swap([i, step], [i, best_col]);
            }
            col_norms_sq.swap(step, best_col);
        }

        let mut alpha = (step..nrow).map(|i| r[[i, step]] * r[[i, step]]).sum::<f64>().sqrt();
        if alpha < f64::EPSILON * 1e3 {
            // Every remaining column is numerically zero
            steps = step;
            break;
        }
        if r[[step, step]] > 0.0 {
            alpha = -alpha;
        }

        let v0 = r[[step, step]] - alpha;
        r[[step, step]] = alpha;
        let v_norm_sq = v0 * v0 + ((step + 1)..nrow).map(|i| r[[i, step]] * r[[i, step]]).sum::<f64>();
        if v_norm_sq < f64::MIN_POSITIVE {
            continue;
        }
        let tau = 2.0 / v_norm_sq;

        for j in (step + 1)..ncol {
            let dot = v0 * r[[step, j]]
                + ((step + 1)..nrow).map(|i| r[[i, step]] * r[[i, j]]).sum::<f64>();
            let scale = tau * dot;
            r[[step, j]] -= scale * v0;
            for i in (step + 1)..nrow {
                let v = r[[i, step]];
                r[[i, j]] -= scale * v;
            }
        }

        for j in (step + 1)..ncol {
            col_norms_sq[j] = (col_norms_sq[j] - r[[step, j]] * r[[step, j]]).max(0.0);
        }
    }

    let max_abs_diag = (0..steps).map(|i| r[[i, i]].abs()).fold(0.0f64, f64::max);
    let tol = nrow.max(ncol) as f64 * f64::EPSILON * max_abs_diag;
    (0..steps).filter(|&i| r[[i, i]].abs() > tol).count()
}

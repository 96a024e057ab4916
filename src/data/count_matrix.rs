//! Count matrix representation for RNA-seq data

use std::collections::HashSet;

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};

use crate::error::{EdgerError, Result};

fn first_duplicate(ids: &[String]) -> Option<&str> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.iter().find(|id| !seen.insert(id.as_str())).map(|s| s.as_str())
}

/// A count matrix of RNA-seq read counts.
/// Rows are genes, columns are samples; row order is preserved by every operation.
#[derive(Debug, Clone, PartialEq)]
pub struct CountMatrix {
    /// Raw count data (genes x samples), integer valued
    counts: Array2<f64>,
    /// Gene identifiers
    gene_ids: Vec<String>,
    /// Sample identifiers
    sample_ids: Vec<String>,
}

impl CountMatrix {
    /// Create a new count matrix from raw data
    pub fn new(
        counts: Array2<f64>,
        gene_ids: Vec<String>,
        sample_ids: Vec<String>,
    ) -> Result<Self> {
        let (n_genes, n_samples) = counts.dim();

        if gene_ids.len() != n_genes {
            return Err(EdgerError::DimensionMismatch {
                expected: format!("{} gene IDs", n_genes),
                got: format!("{} gene IDs", gene_ids.len()),
            });
        }

        if sample_ids.len() != n_samples {
            return Err(EdgerError::DimensionMismatch {
                expected: format!("{} sample IDs", n_samples),
                got: format!("{} sample IDs", sample_ids.len()),
            });
        }

        if let Some(((gene, sample), &value)) = counts
            .indexed_iter()
            .find(|(_, &x)| x < 0.0 || !x.is_finite() || x != x.round())
        {
            return Err(EdgerError::InvalidCountMatrix {
                reason: format!(
                    "count for gene '{}' in sample '{}' is {}; counts must be non-negative integers",
                    gene_ids[gene], sample_ids[sample], value
                ),
            });
        }

        if let Some(dup) = first_duplicate(&gene_ids) {
            return Err(EdgerError::InvalidCountMatrix {
                reason: format!("duplicate gene identifier '{}'", dup),
            });
        }

        if let Some(dup) = first_duplicate(&sample_ids) {
            return Err(EdgerError::InvalidCountMatrix {
                reason: format!("duplicate sample identifier '{}'", dup),
            });
        }

        Ok(Self {
            counts,
            gene_ids,
            sample_ids,
        })
    }

    /// Create from integer counts
    pub fn from_integers(
        counts: Array2<u64>,
        gene_ids: Vec<String>,
        sample_ids: Vec<String>,
    ) -> Result<Self> {
        let float_counts = counts.mapv(|x| x as f64);
        Self::new(float_counts, gene_ids, sample_ids)
    }

    /// Get the number of genes
    pub fn n_genes(&self) -> usize {
        self.counts.nrows()
    }

    /// Get the number of samples
    pub fn n_samples(&self) -> usize {
        self.counts.ncols()
    }

    /// Get the raw counts as a view
    pub fn counts(&self) -> ArrayView2<'_, f64> {
        self.counts.view()
    }

    /// Get gene IDs
    pub fn gene_ids(&self) -> &[String] {
        &self.gene_ids
    }

    /// Get sample IDs
    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    /// Get counts for a specific gene
    pub fn gene_counts(&self, gene_idx: usize) -> ArrayView1<'_, f64> {
        self.counts.row(gene_idx)
    }

    /// Get gene index by ID
    pub fn gene_index(&self, gene_id: &str) -> Option<usize> {
        self.gene_ids.iter().position(|id| id == gene_id)
    }

    /// Sum of counts per sample over the genes currently in the matrix
    pub fn library_sizes(&self) -> Array1<f64> {
        self.counts.sum_axis(Axis(0))
    }

    /// Subset to specific genes, keeping the given order
    pub fn subset_genes(&self, gene_indices: &[usize]) -> Result<Self> {
        let new_counts = self.counts.select(Axis(0), gene_indices);
        let new_gene_ids: Vec<String> = gene_indices
            .iter()
            .map(|&i| self.gene_ids[i].clone())
            .collect();

        Self::new(new_counts, new_gene_ids, self.sample_ids.clone())
    }

    /// Drop genes with zero counts in every sample
    pub fn drop_all_zero_genes(&self) -> Result<Self> {
        let keep: Vec<usize> = (0..self.n_genes())
            .filter(|&i| self.counts.row(i).iter().any(|&x| x > 0.0))
            .collect();

        let dropped = self.n_genes() - keep.len();
        if dropped > 0 {
            log::info!("Dropped {} all-zero genes", dropped);
        }
        if keep.is_empty() {
            return Err(EdgerError::EmptyData {
                reason: "all genes have zero counts in every sample".to_string(),
            });
        }

        self.subset_genes(&keep)
    }
}

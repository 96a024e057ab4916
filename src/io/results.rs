//! Ranked differential expression results

use serde::Serialize;

use crate::annotation::AnnotationSource;
use crate::error::GeneWarning;

/// One gene's row in the final table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultRow {
    pub gene_id: String,
    pub log_fc: f64,
    pub log_cpm: f64,
    pub lr: f64,
    pub p_value: f64,
    pub fdr: f64,
    pub converged: bool,
    pub symbol: String,
    pub description: String,
}

/// Results sorted by raw p-value, ties broken by gene identifier
#[derive(Debug, Clone, Serialize)]
pub struct RankedResult {
    pub contrast: String,
    pub rows: Vec<ResultRow>,
    pub warnings: Vec<GeneWarning>,
}

impl RankedResult {
    pub fn n_genes(&self) -> usize {
        self.rows.len()
    }

    /// Rows with FDR at or below `threshold`, in rank order
    pub fn significant(&self, threshold: f64) -> Vec<&ResultRow> {
        self.rows
            .iter()
            .filter(|r| r.fdr.is_finite() && r.fdr <= threshold)
            .collect()
    }

    /// Row for a gene identifier
    pub fn get(&self, gene_id: &str) -> Option<&ResultRow> {
        self.rows.iter().find(|r| r.gene_id == gene_id)
    }

    /// Fill symbol and description from an annotation source.
    /// Genes the source does not know keep empty fields.
    pub fn annotate<A: AnnotationSource + ?Sized>(&mut self, source: &A) {
        let mut matched = 0;
        for row in &mut self.rows {
            match source.lookup(&row.gene_id) {
                Some(ann) => {
                    row.symbol = ann.symbol;
                    row.description = ann.description;
                    matched += 1;
                }
                None => {
                    row.symbol.clear();
                    row.description.clear();
                }
            }
        }
        log::info!("Annotated {} of {} genes", matched, self.rows.len());
    }

    /// Summary statistics
    pub fn summary(&self, threshold: f64) -> ResultsSummary {
        let significant = self.significant(threshold);
        ResultsSummary {
            total_genes: self.rows.len(),
            genes_tested: self.rows.iter().filter(|r| r.p_value.is_finite()).count(),
            significant: significant.len(),
            upregulated: significant.iter().filter(|r| r.log_fc > 0.0).count(),
            downregulated: significant.iter().filter(|r| r.log_fc < 0.0).count(),
            unconverged: self.rows.iter().filter(|r| !r.converged).count(),
            threshold,
        }
    }
}

/// Counts of tested and significant genes
#[derive(Debug, Clone, Serialize)]
pub struct ResultsSummary {
    pub total_genes: usize,
    pub genes_tested: usize,
    pub significant: usize,
    pub upregulated: usize,
    pub downregulated: usize,
    pub unconverged: usize,
    pub threshold: f64,
}

impl std::fmt::Display for ResultsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Differential Expression Summary")?;
        writeln!(f, "===============================")?;
        writeln!(f, "Total genes: {}", self.total_genes)?;
        writeln!(f, "Genes tested: {}", self.genes_tested)?;
        writeln!(f, "Significant (FDR <= {}): {}", self.threshold, self.significant)?;
        writeln!(f, "  Up-regulated: {}", self.upregulated)?;
        writeln!(f, "  Down-regulated: {}", self.downregulated)?;
        if self.unconverged > 0 {
            writeln!(f, "Fits not converged: {}", self.unconverged)?;
        }
        Ok(())
    }
}

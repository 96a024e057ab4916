//! Contrast testing and multiple-testing correction

mod contrast;
mod fdr;
mod lrt;

pub use contrast::{null_design, ContrastSpec, ResolvedContrast};
pub use fdr::{benjamini_hochberg, rank_results};
pub use lrt::{likelihood_ratio_test, ContrastResults};

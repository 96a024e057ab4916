//! Library-size normalization and CPM transformations

mod counts;
mod tmm;

pub use counts::{ave_log_cpm, cpm, log_cpm, AVE_LOG_CPM_PRIOR};
pub use tmm::{tmm_factors, NormalizationFactors, TmmParams};

//! Data structures for differential expression input

mod count_matrix;
pub mod design;
mod metadata;

pub use count_matrix::CountMatrix;
pub use design::{check_full_rank, encode_factors, SampleDesign};
pub use metadata::SampleTable;
